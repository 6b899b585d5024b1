// src/notify/email.rs
use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::Notifier;
use crate::config::settings::SmtpSettings;
use crate::model::{CanonicalPost, SourceKind};

const TITLE_PREVIEW_CHARS: usize = 100;
const CONTENT_PREVIEW_CHARS: usize = 200;

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailNotifier {
    pub fn from_settings(smtp: &SmtpSettings) -> Result<Self> {
        let from = smtp
            .from
            .parse::<Mailbox>()
            .with_context(|| format!("invalid NOTIFY_EMAIL_FROM `{}`", smtp.from))?;
        let to = smtp
            .to
            .iter()
            .map(|a| {
                a.parse::<Mailbox>()
                    .with_context(|| format!("invalid NOTIFY_EMAIL_TO entry `{a}`"))
            })
            .collect::<Result<Vec<_>>>()?;
        if to.is_empty() {
            return Err(anyhow!("NOTIFY_EMAIL_TO has no recipients"));
        }

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
            .with_context(|| format!("invalid SMTP_HOST `{}`", smtp.host))?;
        if let (Some(user), Some(pass)) = (&smtp.user, &smtp.pass) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        let mailer = builder.build();

        Ok(Self { mailer, from, to })
    }
}

pub fn subject(n: usize) -> String {
    format!("Social Listening Report - {n} new matches across platforms")
}

/// HTML report grouped by source. Everything user-supplied is escaped.
pub fn render_report(posts: &[CanonicalPost]) -> String {
    let mut by_source: BTreeMap<SourceKind, Vec<&CanonicalPost>> = BTreeMap::new();
    for p in posts {
        by_source.entry(p.source).or_default().push(p);
    }

    let mut html = String::from("<html><body>\n");
    html.push_str(&format!(
        "<h1>{}</h1>\n",
        html_escape::encode_text(&subject(posts.len()))
    ));
    for (source, group) in by_source {
        html.push_str(&format!(
            "<h2>{} ({})</h2>\n<ul>\n",
            html_escape::encode_text(source.as_str()),
            group.len()
        ));
        for p in group {
            let headline = match p.title.as_deref().filter(|t| !t.trim().is_empty()) {
                Some(t) => t.to_string(),
                None => p.preview(TITLE_PREVIEW_CHARS),
            };
            html.push_str(&format!(
                "<li><a href=\"{}\">{}</a><br/>by {} &middot; {}<br/>matched: <b>{}</b><br/><i>{}</i></li>\n",
                html_escape::encode_double_quoted_attribute(&p.url),
                html_escape::encode_text(&headline),
                html_escape::encode_text(&p.author),
                p.created_at.format("%Y-%m-%d %H:%M UTC"),
                html_escape::encode_text(&p.matched_term),
                html_escape::encode_text(&p.preview(CONTENT_PREVIEW_CHARS)),
            ));
        }
        html.push_str("</ul>\n");
    }
    html.push_str("</body></html>\n");
    html
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, posts: &[CanonicalPost]) -> Result<()> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject(posts.len()))
            .header(header::ContentType::TEXT_HTML);
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        let msg = builder.body(render_report(posts)).context("build email")?;

        self.mailer.send(msg).await.context("send email")?;
        tracing::info!(target: "notify", recipients = self.to.len(), posts = posts.len(), "report emailed");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceDetails;
    use chrono::Utc;

    fn post(source: SourceKind, title: Option<&str>, content: &str) -> CanonicalPost {
        CanonicalPost {
            source,
            content: content.into(),
            title: title.map(str::to_string),
            author: "<eve>".into(),
            url: "https://example.com/?a=1&b=\"2\"".into(),
            created_at: Utc::now(),
            matched_term: "launch".into(),
            details: SourceDetails::Twitter {
                community: "1".into(),
                likes: 0,
                retweets: 0,
            },
        }
    }

    #[test]
    fn report_groups_and_escapes() {
        let html = render_report(&[
            post(SourceKind::Twitter, None, "<script>alert(1)</script> launch"),
            post(SourceKind::Reddit, Some("Show HN & friends"), "body"),
        ]);
        assert!(html.contains("Social Listening Report - 2 new matches across platforms"));
        assert!(html.contains("<h2>reddit (1)</h2>"));
        assert!(html.contains("<h2>twitter (1)</h2>"));
        assert!(html.find("reddit (1)") < html.find("twitter (1)"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;eve&gt;"));
        assert!(html.contains("Show HN &amp; friends"));
        assert!(html.contains("&quot;2&quot;"));
    }

    #[test]
    fn bad_addresses_are_errors_not_panics() {
        let smtp = SmtpSettings {
            host: "smtp.example.com".into(),
            user: None,
            pass: None,
            from: "not an address".into(),
            to: vec!["ops@example.com".into()],
        };
        assert!(EmailNotifier::from_settings(&smtp).is_err());
    }
}
