// 4.0: external price sources. each market carries a set of registered feeds;
// each feed holds only its latest observation plus a staleness window. stale
// feeds are excluded from aggregation rather than stalling the caller.
// aggregation itself is a median, which bounds the influence of any single
// manipulated source.

use crate::types::{FeedId, Price, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single observation submitted by an external source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub feed_id: FeedId,
    pub price: Price,
    /// Confidence interval, if the source provides one (e.g. Pyth-style).
    pub confidence: Option<Decimal>,
    pub publish_time: Timestamp,
}

impl PriceUpdate {
    pub fn new(feed_id: FeedId, price: Price, publish_time: Timestamp) -> Self {
        Self {
            feed_id,
            price,
            confidence: None,
            publish_time,
        }
    }

    pub fn with_confidence(mut self, confidence: Decimal) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn is_stale(&self, now: Timestamp, max_age_ms: i64) -> bool {
        now.millis_since(self.publish_time) > max_age_ms
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: FeedId,
    pub max_age_ms: i64,
    pub latest: Option<PriceUpdate>,
}

/// The external price sources registered for one market.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedSet {
    feeds: Vec<Feed>,
}

impl FeedSet {
    pub fn new() -> Self {
        Self { feeds: Vec::new() }
    }

    pub fn register(&mut self, id: FeedId, max_age_ms: i64) {
        if !self.feeds.iter().any(|f| f.id == id) {
            self.feeds.push(Feed {
                id,
                max_age_ms,
                latest: None,
            });
        }
    }

    pub fn submit(&mut self, update: PriceUpdate) -> Result<(), FeedError> {
        let feed = self
            .feeds
            .iter_mut()
            .find(|f| f.id == update.feed_id)
            .ok_or(FeedError::FeedNotRegistered(update.feed_id))?;

        // a replayed older observation never overwrites a newer one
        if let Some(existing) = &feed.latest {
            if update.publish_time < existing.publish_time {
                return Err(FeedError::StaleSubmission {
                    feed: update.feed_id,
                    submitted: update.publish_time,
                    latest: existing.publish_time,
                });
            }
        }

        feed.latest = Some(update);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    /// Latest price from every feed that is within its staleness window.
    pub fn fresh_prices(&self, now: Timestamp) -> Vec<Decimal> {
        self.feeds
            .iter()
            .filter_map(|feed| {
                feed.latest.as_ref().and_then(|update| {
                    if update.is_stale(now, feed.max_age_ms) {
                        None
                    } else {
                        Some(update.price.value())
                    }
                })
            })
            .collect()
    }
}

/// Median of a price set: sorted ascending, even counts average the two
/// middle values. Returns `None` on an empty set.
pub fn median(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort();

    let len = sorted.len();
    if len % 2 == 0 {
        Some((sorted[len / 2 - 1] + sorted[len / 2]) / Decimal::TWO)
    } else {
        Some(sorted[len / 2])
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum FeedError {
    #[error("Feed {0:?} is not registered")]
    FeedNotRegistered(FeedId),

    #[error("Stale submission for feed {feed:?}: submitted {submitted:?}, latest {latest:?}")]
    StaleSubmission {
        feed: FeedId,
        submitted: Timestamp,
        latest: Timestamp,
    },
}
