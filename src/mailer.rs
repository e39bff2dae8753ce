use serde::Serialize;

use crate::config::Config;

/// Thin client for the campus mail gateway (plain JSON POST). Credential
/// delivery is fire-and-forget: a downed gateway must not block user
/// creation, so `send_credentials` only logs failures.
#[derive(Clone)]
pub struct Mailer {
    http: reqwest::Client,
    endpoint: Option<String>,
    from: String,
}

#[derive(Debug, Serialize)]
struct OutboundMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: String,
}

impl Mailer {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: cfg.mail_endpoint_url.clone(),
            from: cfg.mail_from.clone(),
        }
    }

    pub async fn send_credentials(&self, to: &str, name: &str, password: &str) {
        let Some(endpoint) = self.endpoint.as_deref() else {
            tracing::info!("mail gateway not configured, skipping credential mail to {to}");
            return;
        };

        let mail = OutboundMail {
            from: &self.from,
            to,
            subject: "Infirmary Portal - Account Created",
            text: format!(
                "Hello {name},\n\n\
                 An infirmary portal account has been created for you.\n\
                 Login email: {to}\n\
                 Temporary password: {password}\n\n\
                 Please change your password after your first login.\n"
            ),
        };

        match self.http.post(endpoint).json(&mail).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!("credential mail sent to {to}");
            }
            Ok(resp) => {
                tracing::warn!("mail gateway returned {} for {to}", resp.status());
            }
            Err(e) => {
                tracing::warn!("failed to send credential mail to {to}: {e}");
            }
        }
    }
}
