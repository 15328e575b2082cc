// src/notify/mod.rs
//! Newsletter delivery.

pub mod email;
pub mod newsletter;

use anyhow::Result;

use crate::models::Article;
use crate::notify::email::Mailer;
use crate::notify::newsletter::{newsletter_subject, render_newsletter};
use crate::store::ArticleStore;

/// Articles pulled from the store when the caller has none to send.
pub const FALLBACK_RECENT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent {
        articles: usize,
        delivered: usize,
        failed: usize,
    },
    NothingToSend,
    NoRecipients,
}

/// Sends the digest of `articles` (or, if empty, the latest stored ones) to
/// each recipient. A failing recipient is logged and counted, not fatal.
pub async fn send_newsletter(
    mailer: &dyn Mailer,
    store: &dyn ArticleStore,
    recipients: &[String],
    articles: Vec<Article>,
) -> Result<Delivery> {
    if recipients.is_empty() {
        return Ok(Delivery::NoRecipients);
    }
    let articles = if articles.is_empty() {
        store.query_recent(FALLBACK_RECENT).await?
    } else {
        articles
    };
    let Some(html) = render_newsletter(&articles) else {
        tracing::info!("no articles, newsletter not sent");
        return Ok(Delivery::NothingToSend);
    };
    let subject = newsletter_subject(articles.len());

    let (mut delivered, mut failed) = (0usize, 0usize);
    for to in recipients {
        match mailer.send_html(to, &subject, &html).await {
            Ok(()) => delivered += 1,
            Err(e) => {
                tracing::warn!(error = ?e, to = %to, "newsletter delivery failed");
                failed += 1;
            }
        }
    }
    tracing::info!(articles = articles.len(), delivered, failed, "newsletter sent");
    Ok(Delivery::Sent {
        articles: articles.len(),
        delivered,
        failed,
    })
}
