use std::ops::ControlFlow;

use chrono::{DateTime, Utc};
use parceldesk_auth::{ApiError, ApiRequest};
use parceldesk_timeline::{classify_order, normalize_events, Stage, StageCounts};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::api::{page_items, ParcelApi};
use crate::entities::{Order, ScanOutcome, TrackDetails};
use crate::error::ClientError;
use crate::validation::validate_tracking_number;

const ORDERS_PATH: &str = "orders/";
const FIND_PATH: &str = "orders/find/";
const CLAIM_PATH: &str = "orders/claim/";
const SCAN_PATH: &str = "orders/scan/";
const TRACK_PATH: &str = "orders/track/";

pub const MAX_ORDER_PAGES: usize = 100;
pub const MAX_STAGE_PAGES: usize = 60;
pub const MAX_STAGE_MATCHES: usize = 300;

impl ParcelApi {
    /// Every order of the signed-in customer.
    pub async fn orders(&self) -> Result<Vec<Order>, ClientError> {
        let mut orders = Vec::new();
        self.for_each_page(ApiRequest::get(ORDERS_PATH), MAX_ORDER_PAGES, |items| {
            orders.extend(items.iter().filter_map(Order::from_value));
            ControlFlow::Continue(())
        })
        .await?;
        Ok(orders)
    }

    pub async fn stage_counts(&self) -> Result<StageCounts, ClientError> {
        let mut counts = StageCounts::default();
        self.for_each_page(ApiRequest::get(ORDERS_PATH), MAX_ORDER_PAGES, |items| {
            for item in items {
                counts.record(item);
            }
            ControlFlow::Continue(())
        })
        .await?;
        debug!(total = counts.total(), "counted orders by stage");
        Ok(counts)
    }

    /// Orders currently in `stage`, capped to keep the listing responsive.
    pub async fn orders_in_stage(&self, stage: Stage) -> Result<Vec<Order>, ClientError> {
        let mut matched = Vec::new();
        self.for_each_page(ApiRequest::get(ORDERS_PATH), MAX_STAGE_PAGES, |items| {
            matched.extend(
                items
                    .iter()
                    .filter(|item| classify_order(item) == Some(stage))
                    .filter_map(Order::from_value),
            );
            if matched.len() >= MAX_STAGE_MATCHES {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await?;
        matched.truncate(MAX_STAGE_MATCHES);
        Ok(matched)
    }

    /// Server-side tracking number suggestions for a partial query.
    pub async fn find(&self, query: &str) -> Result<Vec<String>, ClientError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let body = self
            .fetch(ApiRequest::get(FIND_PATH).query("tracking_number", query))
            .await?;
        Ok(page_items(&body)
            .iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text.clone()),
                other => other
                    .get("tracking_number")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
            .filter(|hint| !hint.is_empty())
            .collect())
    }

    /// Attaches an existing order to the signed-in customer.
    pub async fn claim(&self, tracking_number: &str) -> Result<Value, ClientError> {
        let tracking_number = validate_tracking_number(tracking_number, &self.tracks)?;
        let body = self.post_tracking_number(CLAIM_PATH, &tracking_number).await?;
        self.remember(&tracking_number);
        Ok(body)
    }

    /// Registers a warehouse scan; creates the order if it is new.
    pub async fn scan(&self, tracking_number: &str) -> Result<ScanOutcome, ClientError> {
        let tracking_number = validate_tracking_number(tracking_number, &self.tracks)?;
        let body = self.post_tracking_number(SCAN_PATH, &tracking_number).await?;
        info!(%tracking_number, "scan recorded");
        self.remember(&tracking_number);
        Ok(ScanOutcome::from_body(tracking_number, &body))
    }

    /// Claims the order, creating it through a scan first when the server
    /// does not know it yet. 403 and 409 mean someone else owns it.
    pub async fn claim_or_create(&self, tracking_number: &str) -> Result<Value, ClientError> {
        let tracking_number = validate_tracking_number(tracking_number, &self.tracks)?;

        let first = match self.post_tracking_number(CLAIM_PATH, &tracking_number).await {
            Ok(body) => {
                self.remember(&tracking_number);
                return Ok(body);
            }
            Err(error) => error,
        };

        if matches!(
            first.status(),
            Some(StatusCode::CONFLICT | StatusCode::FORBIDDEN)
        ) {
            return Err(ClientError::ClaimConflict { tracking_number });
        }
        debug!(%tracking_number, error = %first, "claim failed, creating order via scan");

        if let Err(source) = self.post_tracking_number(SCAN_PATH, &tracking_number).await {
            return Err(ClientError::CreateFailed {
                tracking_number,
                source,
            });
        }

        match self.post_tracking_number(CLAIM_PATH, &tracking_number).await {
            Ok(body) => {
                info!(%tracking_number, "order created and claimed");
                self.remember(&tracking_number);
                Ok(body)
            }
            Err(source) => Err(ClientError::ClaimAfterCreateFailed {
                tracking_number,
                source,
            }),
        }
    }

    pub async fn track(&self, tracking_number: &str) -> Result<TrackDetails, ClientError> {
        self.track_at(tracking_number, Utc::now()).await
    }

    /// Status history as of `now`, used to decide which inferred
    /// milestones are already due.
    pub async fn track_at(
        &self,
        tracking_number: &str,
        now: DateTime<Utc>,
    ) -> Result<TrackDetails, ClientError> {
        let tracking_number = validate_tracking_number(tracking_number, &self.tracks)?;
        self.remember(&tracking_number);

        let path = format!("{TRACK_PATH}{}/", urlencoding::encode(&tracking_number));
        let body = match self.fetch(ApiRequest::get(path)).await {
            Ok(body) => body,
            Err(ClientError::Api(error))
                if matches!(
                    error.status(),
                    Some(StatusCode::NOT_FOUND | StatusCode::FORBIDDEN)
                ) =>
            {
                return Err(ClientError::NotFound { tracking_number });
            }
            Err(other) => return Err(other),
        };

        let order = body
            .get("order")
            .filter(|order| order.is_object())
            .cloned()
            .unwrap_or_else(|| body.clone());
        if order.as_object().map_or(true, |fields| fields.is_empty()) && !body.is_array() {
            return Err(ClientError::NotFound { tracking_number });
        }

        let mut events = normalize_events(&body);
        if events.is_empty() {
            events = normalize_events(&order);
        }
        let events = self.enricher.enrich(&events, now);

        let last_status = ["last_status", "status"]
            .iter()
            .filter_map(|key| order.get(key).and_then(Value::as_str))
            .find(|status| !status.is_empty())
            .map(str::to_string)
            .or_else(|| events.last().map(|event| event.status.clone()))
            .unwrap_or_default();

        Ok(TrackDetails {
            tracking_number,
            last_status,
            events,
            order,
        })
    }

    async fn post_tracking_number(
        &self,
        path: &str,
        tracking_number: &str,
    ) -> Result<Value, ApiError> {
        let request =
            ApiRequest::post(path).json(json!({ "tracking_number": tracking_number }));
        Ok(self.client.send(request).await?.body)
    }

    fn remember(&self, tracking_number: &str) {
        if let Err(error) = self.history.remember(tracking_number) {
            warn!(%tracking_number, %error, "failed to update tracking history");
        }
    }
}
