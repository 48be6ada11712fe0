use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::geo::{Coordinate, ViewportPosition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneKind {
    OneThird,
    TwoThird,
    Arrival,
}

impl MilestoneKind {
    /// Evaluation order, lowest threshold first.
    pub const ALL: [MilestoneKind; 3] = [
        MilestoneKind::OneThird,
        MilestoneKind::TwoThird,
        MilestoneKind::Arrival,
    ];

    pub fn threshold(self) -> f64 {
        match self {
            MilestoneKind::OneThird => 1.0 / 3.0,
            MilestoneKind::TwoThird => 2.0 / 3.0,
            MilestoneKind::Arrival => 0.995,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            MilestoneKind::OneThird => "Your drone is a third of the way there",
            MilestoneKind::TwoThird => "Your drone is two thirds of the way there",
            MilestoneKind::Arrival => "Your order has arrived",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub order_id: String,
    pub kind: MilestoneKind,
    pub progress: f64,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    EnRoute,
    Delivered,
    Cancelled,
}

/// Live view of a session, shaped for a map marker, a progress bar and
/// status text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSnapshot {
    pub order_id: String,
    pub restaurant_name: Option<String>,
    pub status: SessionStatus,
    pub position: Coordinate,
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub progress_percent: f64,
    pub eta_minutes: f64,
    pub eta_label: String,
    pub distance_label: String,
    pub route_km: f64,
    pub traveled_km: f64,
    pub milestones: Vec<MilestoneKind>,
    pub events: Vec<TrackingEvent>,
    pub warnings: Vec<String>,
}

/// Everything a client needs to draw the tracking map in percent space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteView {
    pub order_id: String,
    pub flight_path: Vec<ViewportPosition>,
    pub trail: Vec<ViewportPosition>,
    pub origin: ViewportPosition,
    pub destination: ViewportPosition,
    pub marker: ViewportPosition,
}
