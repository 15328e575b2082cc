// src/notify/newsletter.rs
//! HTML digest rendering. No selection logic: callers pass the articles to show.

use html_escape::{encode_double_quoted_attribute, encode_text};
use reqwest::Url;

use crate::models::{Article, SentimentLabel, DEFAULT_SUMMARY};

pub const CONFIRMATION_SUBJECT: &str = "🎉 Bienvenue chez Nexus - Abonnement confirmé !";

pub fn newsletter_subject(count: usize) -> String {
    format!("📢 Nexus : {count} Nouveaux Articles avec Analyse de Sentiment")
}

fn sentiment_style(label: SentimentLabel) -> (&'static str, &'static str) {
    match label {
        SentimentLabel::Positive => ("#10b981", "😊"),
        SentimentLabel::Negative => ("#ef4444", "😞"),
        SentimentLabel::Neutral => ("#f59e0b", "😐"),
    }
}

/// Link paragraph, only for http(s) URLs.
fn read_more(url: &str, color: &str) -> String {
    match Url::parse(url) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => format!(
            r#"  <p><a href="{href}" style="color: {color};">Lire l'article complet →</a></p>
"#,
            href = encode_double_quoted_attribute(url),
        ),
        _ => String::new(),
    }
}

fn render_item(a: &Article) -> String {
    let (color, emoji) = sentiment_style(a.sentiment_label);
    let summary = if a.summary.trim().is_empty() {
        DEFAULT_SUMMARY
    } else {
        a.summary.as_str()
    };
    format!(
        r#"<div style="margin-bottom: 20px; padding: 15px; border-left: 4px solid {color}; background: #f9f9f9;">
  <h3 style="margin: 0 0 10px 0; color: #333;">{emoji} {title}</h3>
  <p style="margin: 5px 0; font-size: 12px; color: #666;"><strong>Source:</strong> {source} | <strong>Sujet:</strong> {topic} | <span style="color: {color}; font-weight: bold;">Sentiment: {label} {emoji}</span></p>
  <p style="color: #555; font-size: 14px;"><strong>📝 Résumé IA:</strong> {summary}</p>
{link}</div>
"#,
        title = encode_text(&a.title),
        source = encode_text(&a.source),
        topic = encode_text(&a.topic.to_uppercase()),
        label = a.sentiment_label.display_fr().to_uppercase(),
        summary = encode_text(summary),
        link = read_more(&a.url, color),
    )
}

/// The digest page, `None` for an empty list.
pub fn render_newsletter(articles: &[Article]) -> Option<String> {
    if articles.is_empty() {
        return None;
    }
    let items: String = articles.iter().map(render_item).collect();
    Some(format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
<div style="background-color: #2563eb; padding: 30px; text-align: center; color: white;">
  <h1 style="margin:0;">🤖 Nexus Daily</h1>
  <p>Votre revue de presse intelligente avec analyse de sentiment</p>
</div>
<div style="background-color: white; padding: 20px;">
<p style="color: #666;">📅 {n} articles sélectionnés pour vous</p>
{items}</div>
<div style="text-align: center; padding: 20px; font-size: 12px; color: #888;">
  <p>Généré par Nexus AI Agent 🤖</p>
  <p>😊 Positif | 😐 Neutre | 😞 Négatif</p>
</div>
</body>
</html>
"#,
        n = articles.len(),
    ))
}

pub fn render_confirmation(email: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
<h1>🤖 Bienvenue chez Nexus !</h1>
<h2>Abonnement confirmé ! 🎉</h2>
<p>Merci de vous être abonné à la newsletter <strong>Nexus</strong>.</p>
<p>Vous recevrez désormais <strong>tous les matins</strong> une sélection des articles les plus importants, analysés et résumés automatiquement.</p>
<p style="font-size: 14px; color: #888;">Email envoyé à : <strong>{email}</strong></p>
</body>
</html>
"#,
        email = encode_text(email),
    )
}
