use std::sync::Arc;

use anyhow::Result;
use reqwest::Client;

use super::{
    config::Config,
    limiter::RateLimiter,
    notify::NotificationSink,
    store::{SubmissionStore, connect},
};

pub struct State {
    pub limiter: RateLimiter,
    pub notifier: NotificationSink,
    pub store: Box<dyn SubmissionStore>,
}

impl State {
    pub async fn new(config: &Config) -> Result<Arc<Self>> {
        let client = Client::builder().timeout(config.http_timeout).build()?;

        let store = connect(&config.store, client.clone()).await?;
        let notifier = NotificationSink::from_config(config.notifier.as_ref(), client);

        Ok(Self::from_parts(
            RateLimiter::new(config.rate_limit),
            notifier,
            store,
        ))
    }

    pub fn from_parts(
        limiter: RateLimiter,
        notifier: NotificationSink,
        store: Box<dyn SubmissionStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            limiter,
            notifier,
            store,
        })
    }
}
