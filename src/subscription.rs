//! Newsletter subscriptions: subscribe, reactivate, unsubscribe. Never deletes.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::models::Subscriber;
use crate::notify::email::{normalize_address, Mailer};
use crate::notify::newsletter::{render_confirmation, CONFIRMATION_SUBJECT};
use crate::store::{StoreError, SubscriberStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscribeOutcome {
    Subscribed,
    Reactivated,
    AlreadySubscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsubscribeOutcome {
    Unsubscribed,
    NotFound,
}

pub struct SubscriptionService {
    store: Arc<dyn SubscriberStore>,
    mailer: Option<Arc<dyn Mailer>>,
}

impl SubscriptionService {
    pub fn new(store: Arc<dyn SubscriberStore>, mailer: Option<Arc<dyn Mailer>>) -> Self {
        Self { store, mailer }
    }

    /// Confirmation emails are best effort: a send failure is logged only.
    async fn confirm(&self, email: &str) {
        let Some(m) = &self.mailer else {
            return;
        };
        if let Err(e) = m
            .send_html(email, CONFIRMATION_SUBJECT, &render_confirmation(email))
            .await
        {
            tracing::warn!(error = ?e, to = %email, "confirmation email failed");
        }
    }

    pub async fn subscribe(&self, raw_email: &str) -> Result<SubscribeOutcome> {
        let email =
            normalize_address(raw_email).ok_or_else(|| anyhow!("invalid email address"))?;

        let outcome = match self.store.find_subscriber(&email).await? {
            Some(s) if s.active => return Ok(SubscribeOutcome::AlreadySubscribed),
            Some(_) => {
                self.store.set_subscriber_active(&email, true).await?;
                SubscribeOutcome::Reactivated
            }
            None => match self.store.create_subscriber(&email).await {
                Ok(_) => SubscribeOutcome::Subscribed,
                // Lost a race with a concurrent subscribe of the same address.
                Err(StoreError::Duplicate { .. }) => return Ok(SubscribeOutcome::AlreadySubscribed),
                Err(e) => return Err(e.into()),
            },
        };
        tracing::info!(email = %email, outcome = ?outcome, "subscription updated");
        self.confirm(&email).await;
        Ok(outcome)
    }

    pub async fn unsubscribe(&self, raw_email: &str) -> Result<UnsubscribeOutcome> {
        let email = raw_email.trim().to_lowercase();
        match self.store.set_subscriber_active(&email, false).await {
            Ok(()) => Ok(UnsubscribeOutcome::Unsubscribed),
            Err(StoreError::SubscriberNotFound { .. }) => Ok(UnsubscribeOutcome::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn active_subscribers(&self) -> Result<Vec<Subscriber>> {
        Ok(self.store.active_subscribers().await?)
    }
}
