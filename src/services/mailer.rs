// src/services/mailer.rs

use async_trait::async_trait;

/// Envio de e-mails transacionais. Renderização de templates e SMTP ficam fora
/// deste serviço; a implementação padrão apenas registra a mensagem no log.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_invite(&self, to: &str, link: &str) -> anyhow::Result<()>;
    async fn send_password_reset(&self, to: &str, link: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_invite(&self, to: &str, link: &str) -> anyhow::Result<()> {
        tracing::info!(%to, %link, "📧 Convite enviado");
        Ok(())
    }

    async fn send_password_reset(&self, to: &str, link: &str) -> anyhow::Result<()> {
        tracing::info!(%to, %link, "📧 Link de recuperação de senha enviado");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_mailer_never_fails() {
        let mailer: Box<dyn Mailer> = Box::new(LogMailer);
        assert!(mailer.send_invite("a@x.com", "https://app/confirm-invite").await.is_ok());
        assert!(mailer.send_password_reset("a@x.com", "https://app/reset").await.is_ok());
    }
}
