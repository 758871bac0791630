use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Geo helpers ---

/// Haversine great-circle distance between two lat/lng points in meters.
/// Callers must guard against missing coordinates; this function assumes
/// both pairs are present and valid.
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let lat1_r = lat1.to_radians();
    let lat2_r = lat2.to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1_r.cos() * lat2_r.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_M * c
}

// --- Enums ---

/// External source platform a record was crawled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    KakaoMap,
    NaverMap,
    NaverBlog,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::KakaoMap => "kakao_map",
            Platform::NaverMap => "naver_map",
            Platform::NaverBlog => "naver_blog",
        }
    }

    pub fn parse(s: &str) -> Option<Platform> {
        match s {
            "kakao_map" => Some(Platform::KakaoMap),
            "naver_map" => Some(Platform::NaverMap),
            "naver_blog" => Some(Platform::NaverBlog),
            _ => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operational lifecycle of a venue.
///
/// `ClosedConfirmed` is terminal within the engine — only manual
/// intervention moves a venue out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueStatus {
    New,
    Active,
    ClosedSuspected,
    ClosedConfirmed,
}

impl VenueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueStatus::New => "new",
            VenueStatus::Active => "active",
            VenueStatus::ClosedSuspected => "closed_suspected",
            VenueStatus::ClosedConfirmed => "closed_confirmed",
        }
    }

    pub fn parse(s: &str) -> Option<VenueStatus> {
        match s {
            "new" => Some(VenueStatus::New),
            "active" => Some(VenueStatus::Active),
            "closed_suspected" => Some(VenueStatus::ClosedSuspected),
            "closed_confirmed" => Some(VenueStatus::ClosedConfirmed),
            _ => None,
        }
    }

    /// Position along the lifecycle. Status hints from crawled records may
    /// only move a venue forward (higher rank), never backward.
    pub fn rank(&self) -> u8 {
        match self {
            VenueStatus::New => 0,
            VenueStatus::Active => 1,
            VenueStatus::ClosedSuspected => 2,
            VenueStatus::ClosedConfirmed => 3,
        }
    }
}

impl std::fmt::Display for VenueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// --- Catalog entities ---

/// Canonical catalog entry for one physical venue.
///
/// Invariant: at most one venue exists per `(source_platform, platform_id)`
/// pair. The pair names the venue's primary identity — the platform it was
/// first discovered on. Additional platforms it is later confirmed on hang
/// off the venue as [`PlatformSnapshot`] children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Venue {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub description: Option<String>,
    /// Absent when the source platform provides no coordinates.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub source_platform: Platform,
    pub platform_id: String,
    pub status: VenueStatus,
    pub last_synced_at: DateTime<Utc>,
    /// Running counters, maintained transactionally alongside the
    /// triggering write — never recomputed by scanning rows.
    pub review_count: i32,
    pub bookmark_count: i32,
    pub rating_avg: f64,
    pub created_at: DateTime<Utc>,
}

impl Venue {
    pub fn coords(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }
}

/// Most recent raw payload from one external platform for one venue.
/// Replaced wholesale on each re-crawl; no history is retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformSnapshot {
    pub id: Uuid,
    pub venue_id: Uuid,
    pub platform: Platform,
    pub raw_payload: serde_json::Value,
    // Legacy scalar fields for platforms not yet migrated to raw payloads.
    pub rating: Option<f64>,
    pub review_count: Option<i32>,
    pub link: Option<String>,
    pub last_checked_at: DateTime<Utc>,
}

/// A review attached to a venue. Append-only after insert.
///
/// Crawled reviews carry `(source_platform, platform_review_id)` and are
/// deduplicated on that pair. First-party reviews submitted through the
/// product carry neither and are always inserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub venue_id: Uuid,
    pub source_platform: Option<Platform>,
    pub platform_review_id: Option<String>,
    pub author: String,
    pub rating: i32,
    pub content: String,
    pub image_url: Option<String>,
    /// When the review was written on the platform. Drives watermark
    /// comparisons for incremental sync.
    pub created_at: DateTime<Utc>,
    /// When the engine ingested the review. Audit only.
    pub crawled_at: DateTime<Utc>,
}

// --- Crawler boundary DTOs ---

/// One normalized venue record from the crawler collaborator.
/// `None` optional fields mean "unknown", never "empty string" — the
/// distinction matters for the dedup rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawledRecord {
    pub platform: Platform,
    pub platform_id: String,
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    pub business_hours: Option<String>,
    pub category: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Optional status observed by the crawler (e.g. a "permanently
    /// closed" banner). Applied forward-only along the lifecycle.
    pub status_hint: Option<VenueStatus>,
    pub raw_payload: serde_json::Value,
}

impl CrawledRecord {
    pub fn coords(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }

    /// Compose a description from crawl metadata. Returns `None` when
    /// neither category nor business hours are known, so an existing
    /// description is never clobbered with an empty one.
    pub fn compose_description(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(category) = self.category.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("category: {category}"));
        }
        if let Some(hours) = self.business_hours.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("hours: {hours}"));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }
}

/// One review from the crawler collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawledReview {
    pub platform_review_id: String,
    pub nickname: String,
    pub rating: i32,
    pub content: String,
    pub review_date: DateTime<Utc>,
    pub image_url: Option<String>,
}
