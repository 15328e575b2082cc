//! Morning job: scrape the main topics and mail the digest to every active subscriber.

use std::process::ExitCode;

use anyhow::{Context, Result};
use nexus::notify::{send_newsletter, Delivery};
use nexus::store::ArticleStore;
use nexus::{telemetry, Runtime};

const DAILY_TOPICS: [&str; 4] = ["économie", "politique", "sport", "climat"];
const MIN_FRESH_ARTICLES: usize = 5;
const FALLBACK_RECENT: usize = 10;

async fn run() -> Result<()> {
    let rt = Runtime::from_env().await?;

    let recipients: Vec<String> = rt
        .subscriptions
        .active_subscribers()
        .await?
        .into_iter()
        .map(|s| s.email)
        .collect();
    if recipients.is_empty() {
        tracing::info!("no active subscribers, nothing to do");
        return Ok(());
    }
    tracing::info!(subscribers = recipients.len(), "daily newsletter starting");

    let topics: Vec<String> = DAILY_TOPICS.iter().map(|t| t.to_string()).collect();
    let mut articles = Vec::new();
    for (topic, found) in rt.pipeline.scrape_topics(&topics, None).await {
        tracing::info!(topic = %topic, found = found.len(), "topic done");
        articles.extend(found);
    }

    if articles.len() < MIN_FRESH_ARTICLES {
        tracing::warn!(
            scraped = articles.len(),
            "few fresh articles, using the most recent stored ones"
        );
        articles = rt.store.query_recent(FALLBACK_RECENT).await?;
    }

    let mailer = rt
        .mailer
        .as_deref()
        .context("SMTP is not configured, cannot send the newsletter")?;
    match send_newsletter(mailer, rt.store.as_ref(), &recipients, articles).await? {
        Delivery::Sent {
            articles,
            delivered,
            failed,
        } => {
            tracing::info!(articles, delivered, failed, "daily newsletter done");
            anyhow::ensure!(delivered > 0, "newsletter could not be delivered to anyone");
        }
        other => tracing::info!(outcome = ?other, "daily newsletter not sent"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = ?e, "daily newsletter failed");
            ExitCode::FAILURE
        }
    }
}
