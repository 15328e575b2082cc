// tests/newsletter.rs
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use nexus::models::{NewArticle, SentimentLabel};
use nexus::notify::email::Mailer;
use nexus::notify::{send_newsletter, Delivery};
use nexus::store::{ArticleStore, MemoryStore};

/// Records deliveries; addresses in `reject` fail like a refused RCPT.
#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<(String, String)>>,
    reject: Vec<String>,
}

#[async_trait]
impl Mailer for Outbox {
    async fn send_html(&self, to: &str, _subject: &str, html: &str) -> Result<()> {
        if self.reject.iter().any(|r| r == to) {
            anyhow::bail!("550 mailbox unavailable");
        }
        self.sent.lock().unwrap().push((to.into(), html.into()));
        Ok(())
    }
}

async fn seed(store: &MemoryStore, n: usize) {
    for i in 0..n {
        store
            .insert(NewArticle {
                url: format!("https://ex.test/{i}"),
                title: format!("Article {i}"),
                source: "lemonde".into(),
                topic: "économie".into(),
                published_at: Utc::now(),
                content: "corps".into(),
                sentiment_score: 0.3,
                sentiment_label: SentimentLabel::Positive,
                summary: format!("Résumé {i}"),
                reliability_score: 60,
                source_count: 4,
            })
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn empty_selection_falls_back_to_recent_articles() {
    let store = MemoryStore::new();
    seed(&store, 60).await;
    let outbox = Outbox::default();

    let got = send_newsletter(&outbox, &store, &["a@ex.fr".to_string()], Vec::new())
        .await
        .unwrap();
    assert_eq!(
        got,
        Delivery::Sent {
            articles: 50,
            delivered: 1,
            failed: 0
        }
    );
    let sent = outbox.sent.lock().unwrap();
    // Most recent first.
    assert!(sent[0].1.contains("Article 59"));
    assert!(!sent[0].1.contains("Article 9<"));
}

#[tokio::test]
async fn nothing_stored_means_nothing_sent() {
    let outbox = Outbox::default();
    let got = send_newsletter(&outbox, &MemoryStore::new(), &["a@ex.fr".to_string()], Vec::new())
        .await
        .unwrap();
    assert_eq!(got, Delivery::NothingToSend);
    assert!(outbox.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn one_bad_recipient_does_not_stop_the_others() {
    let store = MemoryStore::new();
    seed(&store, 2).await;
    let articles = store.query_recent(2).await.unwrap();
    let outbox = Outbox {
        reject: vec!["bounce@ex.fr".into()],
        ..Outbox::default()
    };

    let to = vec![
        "a@ex.fr".to_string(),
        "bounce@ex.fr".to_string(),
        "b@ex.fr".to_string(),
    ];
    let got = send_newsletter(&outbox, &store, &to, articles).await.unwrap();
    assert_eq!(
        got,
        Delivery::Sent {
            articles: 2,
            delivered: 2,
            failed: 1
        }
    );
}

#[tokio::test]
async fn no_recipients_is_reported() {
    let outbox = Outbox::default();
    let got = send_newsletter(&outbox, &MemoryStore::new(), &[], Vec::new())
        .await
        .unwrap();
    assert_eq!(got, Delivery::NoRecipients);
}
