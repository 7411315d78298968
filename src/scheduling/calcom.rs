//! Cal.com-style scheduling service client.
//!
//! Two operations: slot queries (conflict detection) and booking creation.
//! Booking creation embeds the conference join link, which therefore must
//! exist before this client is called.

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use secrecy::ExposeSecret;

use crate::config::CalComConfig;
use crate::error::CollaboratorError;
use crate::scheduling::{BookingRecord, SchedulingService, TimeWindow};

pub struct CalComClient {
    http: reqwest::Client,
    config: CalComConfig,
}

impl CalComClient {
    pub fn new(config: CalComConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl SchedulingService for CalComClient {
    async fn find_slots(
        &self,
        from: DateTime<Tz>,
        to: DateTime<Tz>,
    ) -> Result<Vec<TimeWindow>, CollaboratorError> {
        let response = self
            .http
            .get(format!("{}/slots", self.config.base_url))
            .query(&[
                ("apiKey", self.config.api_key.expose_secret().to_string()),
                ("eventTypeId", self.config.event_type_id.to_string()),
                ("startTime", from.to_rfc3339()),
                ("endTime", to.to_rfc3339()),
                ("timeZone", from.timezone().name().to_string()),
            ])
            .send()
            .await
            .map_err(|e| CollaboratorError::Http {
                service: "cal.com".to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Api {
                service: "cal.com".to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let payload: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| CollaboratorError::InvalidResponse {
                    service: "cal.com".to_string(),
                    reason: format!("slots response: {e}"),
                })?;

        let duration = to - from;
        let tz = from.timezone();
        let slots = parse_slot_times(&payload)
            .into_iter()
            .filter_map(|start| {
                let start = start.with_timezone(&tz);
                TimeWindow::new(start, start + duration).ok()
            })
            .collect();

        Ok(slots)
    }

    async fn create_booking(&self, record: &BookingRecord) -> Result<String, CollaboratorError> {
        let body = serde_json::json!({
            "eventTypeId": self.config.event_type_id,
            "start": record.slot.start().to_rfc3339(),
            "end": record.slot.end().to_rfc3339(),
            "responses": {
                "name": record.attendee_name,
                "email": record.attendee_address,
            },
            "timeZone": record.slot.start().timezone().name(),
            "metadata": {
                "videoCallUrl": record.conference_link,
            },
        });

        let response = self
            .http
            .post(format!("{}/bookings", self.config.base_url))
            .query(&[("apiKey", self.config.api_key.expose_secret())])
            .json(&body)
            .send()
            .await
            .map_err(|e| CollaboratorError::Http {
                service: "cal.com".to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Api {
                service: "cal.com".to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let payload: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| CollaboratorError::InvalidResponse {
                    service: "cal.com".to_string(),
                    reason: format!("booking response: {e}"),
                })?;

        let booking_id = payload
            .get("uid")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| payload.get("id").map(|v| v.to_string()))
            .ok_or_else(|| CollaboratorError::InvalidResponse {
                service: "cal.com".to_string(),
                reason: "booking response has no id".to_string(),
            })?;

        tracing::info!(booking_id = %booking_id, "Booking created");
        Ok(booking_id)
    }
}

/// Pull slot start times out of the `{"slots": {"date": [{"time": ...}]}}`
/// response shape.
fn parse_slot_times(payload: &serde_json::Value) -> Vec<DateTime<chrono::FixedOffset>> {
    let Some(days) = payload.get("slots").and_then(|s| s.as_object()) else {
        return Vec::new();
    };

    let mut times: Vec<_> = days
        .values()
        .filter_map(|day| day.as_array())
        .flatten()
        .filter_map(|slot| slot.get("time").and_then(|t| t.as_str()))
        .filter_map(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .collect();
    times.sort();
    times
}
