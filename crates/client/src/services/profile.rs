use std::ops::ControlFlow;

use parceldesk_auth::ApiRequest;
use serde_json::Value;
use tracing::{debug, info};

use crate::api::{page_items, ParcelApi};
use crate::entities::{HomeSummary, PickupPoint, User, Warehouse};
use crate::error::ClientError;
use crate::validation::ProfileForm;

const ME_PATH: &str = "me/";
const PICKUP_POINTS_PATH: &str = "pickup-points/";
const WAREHOUSES_PATH: &str = "warehouses/";
const MAX_PICKUP_PAGES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileUpdate {
    /// Nothing differed, no request was made.
    Unchanged,
    Updated,
}

impl ParcelApi {
    /// Current account; also refreshes the cached copy.
    pub async fn me(&self) -> Result<User, ClientError> {
        let user: User = self.client.send(ApiRequest::get(ME_PATH)).await?.json()?;
        self.cache_user(Some(&user))?;
        Ok(user)
    }

    /// Sends only what changed between `initial` and `edited`.
    pub async fn update_profile(
        &self,
        initial: &ProfileForm,
        edited: &ProfileForm,
    ) -> Result<ProfileUpdate, ClientError> {
        edited.validate()?;

        let changes = edited.changes_from(initial);
        if changes.is_empty() {
            debug!("profile unchanged, skipping request");
            return Ok(ProfileUpdate::Unchanged);
        }

        let fields: Vec<&str> = changes.keys().map(String::as_str).collect();
        info!(?fields, "updating profile");
        self.client
            .send(ApiRequest::patch(ME_PATH).json(Value::Object(changes)))
            .await?;
        Ok(ProfileUpdate::Updated)
    }

    /// All pickup points matching `search`, across every page. Entries
    /// without an id cannot be selected and are skipped.
    pub async fn pickup_points(&self, search: &str) -> Result<Vec<PickupPoint>, ClientError> {
        let mut request = ApiRequest::get(PICKUP_POINTS_PATH);
        let search = search.trim();
        if !search.is_empty() {
            request = request.query("search", search);
        }

        let mut points = Vec::new();
        self.for_each_page(request, MAX_PICKUP_PAGES, |items| {
            points.extend(
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value::<PickupPoint>(item.clone()).ok())
                    .filter(|point| point.id.is_some()),
            );
            ControlFlow::Continue(())
        })
        .await?;
        Ok(points)
    }

    /// Client code, pickup point and the China warehouse to ship to.
    pub async fn home_summary(&self) -> Result<HomeSummary, ClientError> {
        let user = self.me().await?;
        let pickup_point = user.pickup_point.as_ref();

        let warehouse = match pickup_point.and_then(PickupPoint::cn_warehouse_id) {
            Some(id) => {
                let path = format!("{WAREHOUSES_PATH}{id}/");
                Some(self.client.send(ApiRequest::get(path)).await?.json::<Warehouse>()?)
            }
            None => {
                let body = self
                    .fetch(ApiRequest::get(WAREHOUSES_PATH).query("is_active", "true"))
                    .await?;
                page_items(&body)
                    .first()
                    .and_then(|item| serde_json::from_value::<Warehouse>(item.clone()).ok())
            }
        };

        Ok(HomeSummary {
            client_code_display: user.display_code().to_string(),
            client_code_short: user.short_code(),
            pickup_text: pickup_point.map(PickupPoint::label_text).unwrap_or_default(),
            warehouse,
        })
    }
}
