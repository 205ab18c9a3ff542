// src/common/cookies.rs

//! Cookies httpOnly com as credenciais (`access` / `refresh`).

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

pub const ACCESS_COOKIE: &str = "access";
pub const REFRESH_COOKIE: &str = "refresh";

fn build(name: &'static str, value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}

/// Grava as credenciais emitidas. Sem refresh (emissão degradada), o cookie
/// de refresh anterior é apagado para não ficar um token órfão.
pub fn store_credentials(
    jar: CookieJar,
    access: &str,
    refresh: Option<&str>,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
    secure: bool,
) -> CookieJar {
    let jar = jar.add(build(
        ACCESS_COOKIE,
        access.to_string(),
        Duration::seconds(access_ttl.num_seconds()),
        secure,
    ));
    match refresh {
        Some(refresh) => jar.add(build(
            REFRESH_COOKIE,
            refresh.to_string(),
            Duration::seconds(refresh_ttl.num_seconds()),
            secure,
        )),
        None => jar.remove(build(REFRESH_COOKIE, String::new(), Duration::ZERO, secure)),
    }
}

pub fn clear_credentials(jar: CookieJar, secure: bool) -> CookieJar {
    jar.remove(build(ACCESS_COOKIE, String::new(), Duration::ZERO, secure))
        .remove(build(REFRESH_COOKIE, String::new(), Duration::ZERO, secure))
}

pub fn read(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_cookies_are_http_only_and_scoped_to_root() {
        let jar = store_credentials(
            CookieJar::new(),
            "a.b.c",
            Some("r.s.t"),
            chrono::Duration::minutes(120),
            chrono::Duration::minutes(1440),
            false,
        );
        let access = jar.get(ACCESS_COOKIE).unwrap();
        assert_eq!(access.value(), "a.b.c");
        assert_eq!(access.http_only(), Some(true));
        assert_eq!(access.path(), Some("/"));
        assert_eq!(access.max_age(), Some(Duration::minutes(120)));
        assert_eq!(read(&jar, REFRESH_COOKIE).as_deref(), Some("r.s.t"));
    }

    #[test]
    fn missing_refresh_drops_the_old_cookie() {
        let jar = CookieJar::new().add(Cookie::new(REFRESH_COOKIE, "velho"));
        let jar = store_credentials(
            jar,
            "a.b.c",
            None,
            chrono::Duration::minutes(1),
            chrono::Duration::minutes(1),
            false,
        );
        assert_eq!(read(&jar, REFRESH_COOKIE), None);
        assert!(read(&clear_credentials(jar, false), ACCESS_COOKIE).is_none());
    }
}
