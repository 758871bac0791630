//! Postgres implementation of [`CatalogStore`].
//!
//! Runtime-bound sqlx queries with `FromRow` row structs. Multi-row
//! writes run inside a single transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use placematch_common::{
    CatalogError, Platform, PlatformSnapshot, Result, Review, Venue, VenueStatus,
};

use crate::cell;
use crate::store::{CatalogStore, NewReview, NewSnapshot, NewVenue, VenueFieldPatch};

pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(db)?;
        info!("catalog database pool established");
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CatalogError::Database(e.to_string()))?;
        info!("catalog migrations applied");
        Ok(())
    }
}

/// A row from the venues table. Derived columns (normalized forms, geo
/// cell) stay internal to the store.
#[derive(Debug, Clone, sqlx::FromRow)]
struct VenueRow {
    id: Uuid,
    name: String,
    address: String,
    phone: String,
    description: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    source_platform: String,
    platform_id: String,
    status: String,
    last_synced_at: DateTime<Utc>,
    review_count: i32,
    bookmark_count: i32,
    rating_avg: f64,
    created_at: DateTime<Utc>,
}

impl VenueRow {
    fn into_venue(self) -> Result<Venue> {
        let source_platform = Platform::parse(&self.source_platform).ok_or_else(|| {
            CatalogError::Database(format!("unknown platform in venues row: {}", self.source_platform))
        })?;
        let status = VenueStatus::parse(&self.status).ok_or_else(|| {
            CatalogError::Database(format!("unknown status in venues row: {}", self.status))
        })?;
        Ok(Venue {
            id: self.id,
            name: self.name,
            address: self.address,
            phone: self.phone,
            description: self.description,
            latitude: self.latitude,
            longitude: self.longitude,
            source_platform,
            platform_id: self.platform_id,
            status,
            last_synced_at: self.last_synced_at,
            review_count: self.review_count,
            bookmark_count: self.bookmark_count,
            rating_avg: self.rating_avg,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SnapshotRow {
    id: Uuid,
    venue_id: Uuid,
    platform: String,
    raw_payload: serde_json::Value,
    rating: Option<f64>,
    review_count: Option<i32>,
    link: Option<String>,
    last_checked_at: DateTime<Utc>,
}

impl SnapshotRow {
    fn into_snapshot(self) -> Result<PlatformSnapshot> {
        let platform = Platform::parse(&self.platform).ok_or_else(|| {
            CatalogError::Database(format!("unknown platform in snapshot row: {}", self.platform))
        })?;
        Ok(PlatformSnapshot {
            id: self.id,
            venue_id: self.venue_id,
            platform,
            raw_payload: self.raw_payload,
            rating: self.rating,
            review_count: self.review_count,
            link: self.link,
            last_checked_at: self.last_checked_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ReviewRow {
    id: Uuid,
    venue_id: Uuid,
    source_platform: Option<String>,
    platform_review_id: Option<String>,
    author: String,
    rating: i32,
    content: String,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
    crawled_at: DateTime<Utc>,
}

impl ReviewRow {
    fn into_review(self) -> Result<Review> {
        let source_platform = match self.source_platform {
            Some(s) => Some(Platform::parse(&s).ok_or_else(|| {
                CatalogError::Database(format!("unknown platform in review row: {s}"))
            })?),
            None => None,
        };
        Ok(Review {
            id: self.id,
            venue_id: self.venue_id,
            source_platform,
            platform_review_id: self.platform_review_id,
            author: self.author,
            rating: self.rating,
            content: self.content,
            image_url: self.image_url,
            created_at: self.created_at,
            crawled_at: self.crawled_at,
        })
    }
}

fn db(e: sqlx::Error) -> CatalogError {
    CatalogError::Database(e.to_string())
}

fn venues_from(rows: Vec<VenueRow>) -> Result<Vec<Venue>> {
    rows.into_iter().map(VenueRow::into_venue).collect()
}

#[async_trait]
impl CatalogStore for PgCatalog {
    async fn venue(&self, id: Uuid) -> Result<Option<Venue>> {
        let row = sqlx::query_as::<_, VenueRow>("SELECT * FROM venues WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        row.map(VenueRow::into_venue).transpose()
    }

    async fn venues_by_platform_identity(
        &self,
        platform: Platform,
        platform_id: &str,
    ) -> Result<Vec<Venue>> {
        let rows = sqlx::query_as::<_, VenueRow>(
            "SELECT * FROM venues WHERE source_platform = $1 AND platform_id = $2",
        )
        .bind(platform.as_str())
        .bind(platform_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        venues_from(rows)
    }

    async fn venues_near(&self, lat: f64, lng: f64) -> Result<Vec<Venue>> {
        let cells = cell::probe_cells(lat, lng);
        if cells.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, VenueRow>("SELECT * FROM venues WHERE geo_cell = ANY($1)")
            .bind(&cells)
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;
        venues_from(rows)
    }

    async fn venues_by_normalized_phone(&self, normalized_phone: &str) -> Result<Vec<Venue>> {
        let rows = sqlx::query_as::<_, VenueRow>(
            "SELECT * FROM venues WHERE normalized_phone = $1 AND normalized_phone <> ''",
        )
        .bind(normalized_phone)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        venues_from(rows)
    }

    async fn venues_by_name_and_address(
        &self,
        name: &str,
        normalized_address: &str,
    ) -> Result<Vec<Venue>> {
        let rows = sqlx::query_as::<_, VenueRow>(
            "SELECT * FROM venues WHERE name = $1 AND normalized_address = $2",
        )
        .bind(name)
        .bind(normalized_address)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        venues_from(rows)
    }

    async fn venues_by_source_platform(&self, platform: Platform) -> Result<Vec<Venue>> {
        let rows =
            sqlx::query_as::<_, VenueRow>("SELECT * FROM venues WHERE source_platform = $1")
                .bind(platform.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(db)?;
        venues_from(rows)
    }

    async fn venues_by_status(&self, status: VenueStatus) -> Result<Vec<Venue>> {
        let rows = sqlx::query_as::<_, VenueRow>("SELECT * FROM venues WHERE status = $1")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;
        venues_from(rows)
    }

    async fn venues_stale_since(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<Venue>> {
        let rows = sqlx::query_as::<_, VenueRow>(
            "SELECT * FROM venues WHERE last_synced_at < $1 ORDER BY last_synced_at ASC LIMIT $2",
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        venues_from(rows)
    }

    async fn insert_venue(&self, venue: NewVenue) -> Result<Venue> {
        let geo_cell = match (venue.latitude, venue.longitude) {
            (Some(lat), Some(lng)) => cell::cell_for(lat, lng),
            _ => None,
        };
        let row = sqlx::query_as::<_, VenueRow>(
            r#"
            INSERT INTO venues
                (id, name, address, phone, description, latitude, longitude,
                 source_platform, platform_id, status, last_synced_at,
                 review_count, bookmark_count, rating_avg, created_at,
                 normalized_phone, normalized_address, geo_cell)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), 0, 0, 0.0, NOW(), $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&venue.name)
        .bind(&venue.address)
        .bind(&venue.phone)
        .bind(&venue.description)
        .bind(venue.latitude)
        .bind(venue.longitude)
        .bind(venue.source_platform.as_str())
        .bind(&venue.platform_id)
        .bind(venue.status.as_str())
        .bind(&venue.normalized_phone)
        .bind(&venue.normalized_address)
        .bind(&geo_cell)
        .fetch_one(&self.pool)
        .await
        .map_err(db)?;
        row.into_venue()
    }

    async fn update_venue_fields(&self, id: Uuid, patch: VenueFieldPatch) -> Result<()> {
        let geo_cell = match (patch.latitude, patch.longitude) {
            (Some(lat), Some(lng)) => cell::cell_for(lat, lng),
            _ => None,
        };
        let result = sqlx::query(
            r#"
            UPDATE venues SET
                name = COALESCE($2, name),
                address = COALESCE($3, address),
                normalized_address = COALESCE($4, normalized_address),
                phone = COALESCE($5, phone),
                normalized_phone = COALESCE($6, normalized_phone),
                description = COALESCE($7, description),
                latitude = COALESCE($8, latitude),
                longitude = COALESCE($9, longitude),
                geo_cell = COALESCE($10, geo_cell),
                last_synced_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.address)
        .bind(&patch.normalized_address)
        .bind(&patch.phone)
        .bind(&patch.normalized_phone)
        .bind(&patch.description)
        .bind(patch.latitude)
        .bind(patch.longitude)
        .bind(&geo_cell)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(format!("venue {id}")));
        }
        Ok(())
    }

    async fn set_status(&self, id: Uuid, status: VenueStatus) -> Result<()> {
        let result =
            sqlx::query("UPDATE venues SET status = $2, last_synced_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(status.as_str())
                .execute(&self.pool)
                .await
                .map_err(db)?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(format!("venue {id}")));
        }
        Ok(())
    }

    async fn touch_last_synced(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE venues SET last_synced_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn upsert_snapshot(&self, snapshot: NewSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO platform_snapshots
                (id, venue_id, platform, raw_payload, rating, review_count, link, last_checked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (venue_id, platform) DO UPDATE SET
                raw_payload = EXCLUDED.raw_payload,
                rating = EXCLUDED.rating,
                review_count = EXCLUDED.review_count,
                link = EXCLUDED.link,
                last_checked_at = NOW()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(snapshot.venue_id)
        .bind(snapshot.platform.as_str())
        .bind(&snapshot.raw_payload)
        .bind(snapshot.rating)
        .bind(snapshot.review_count)
        .bind(&snapshot.link)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn snapshots_for_venue(&self, venue_id: Uuid) -> Result<Vec<PlatformSnapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            "SELECT * FROM platform_snapshots WHERE venue_id = $1 ORDER BY platform",
        )
        .bind(venue_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        rows.into_iter().map(SnapshotRow::into_snapshot).collect()
    }

    async fn latest_review_date(
        &self,
        venue_id: Uuid,
        platform: Platform,
    ) -> Result<Option<DateTime<Utc>>> {
        let max = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT MAX(created_at) FROM reviews WHERE venue_id = $1 AND source_platform = $2",
        )
        .bind(venue_id)
        .bind(platform.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db)?;
        Ok(max)
    }

    async fn review_exists(&self, platform: Platform, platform_review_id: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM reviews WHERE source_platform = $1 AND platform_review_id = $2)",
        )
        .bind(platform.as_str())
        .bind(platform_review_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db)?;
        Ok(exists)
    }

    async fn insert_crawled_reviews(
        &self,
        venue_id: Uuid,
        reviews: Vec<NewReview>,
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        let mut inserted = 0usize;

        for review in &reviews {
            // The partial unique index makes the insert idempotent under
            // concurrent re-runs with overlapping input.
            let result = sqlx::query(
                r#"
                INSERT INTO reviews
                    (id, venue_id, source_platform, platform_review_id, author,
                     rating, content, image_url, created_at, crawled_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
                ON CONFLICT (source_platform, platform_review_id)
                    WHERE source_platform IS NOT NULL AND platform_review_id IS NOT NULL
                    DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(venue_id)
            .bind(review.source_platform.map(|p| p.as_str()))
            .bind(&review.platform_review_id)
            .bind(&review.author)
            .bind(review.rating)
            .bind(&review.content)
            .bind(&review.image_url)
            .bind(review.created_at)
            .execute(&mut *tx)
            .await
            .map_err(db)?;
            inserted += result.rows_affected() as usize;
        }

        sqlx::query("UPDATE venues SET last_synced_at = NOW() WHERE id = $1")
            .bind(venue_id)
            .execute(&mut *tx)
            .await
            .map_err(db)?;

        tx.commit().await.map_err(db)?;
        Ok(inserted)
    }

    async fn insert_user_review(&self, venue_id: Uuid, review: NewReview) -> Result<Review> {
        let mut tx = self.pool.begin().await.map_err(db)?;

        let row = sqlx::query_as::<_, ReviewRow>(
            r#"
            INSERT INTO reviews
                (id, venue_id, source_platform, platform_review_id, author,
                 rating, content, image_url, created_at, crawled_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(venue_id)
        .bind(review.source_platform.map(|p| p.as_str()))
        .bind(&review.platform_review_id)
        .bind(&review.author)
        .bind(review.rating)
        .bind(&review.content)
        .bind(&review.image_url)
        .bind(review.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(db)?;

        // Running counters: old column values on the right-hand side all
        // refer to the pre-update row, so both expressions see the same
        // review_count.
        let result = sqlx::query(
            r#"
            UPDATE venues SET
                rating_avg = (rating_avg * review_count + $2) / (review_count + 1),
                review_count = review_count + 1
            WHERE id = $1
            "#,
        )
        .bind(venue_id)
        .bind(review.rating as f64)
        .execute(&mut *tx)
        .await
        .map_err(db)?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(format!("venue {venue_id}")));
        }

        tx.commit().await.map_err(db)?;
        row.into_review()
    }

    async fn delete_review(&self, review_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db)?;

        let row = sqlx::query_as::<_, ReviewRow>("SELECT * FROM reviews WHERE id = $1")
            .bind(review_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db)?
            .ok_or_else(|| CatalogError::NotFound(format!("review {review_id}")))?;

        sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(review_id)
            .execute(&mut *tx)
            .await
            .map_err(db)?;

        sqlx::query(
            r#"
            UPDATE venues SET
                rating_avg = CASE
                    WHEN review_count > 1
                        THEN (rating_avg * review_count - $2) / (review_count - 1)
                    ELSE 0.0
                END,
                review_count = GREATEST(0, review_count - 1)
            WHERE id = $1
            "#,
        )
        .bind(row.venue_id)
        .bind(row.rating as f64)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        tx.commit().await.map_err(db)?;
        Ok(())
    }

    async fn reviews_for_venue(&self, venue_id: Uuid) -> Result<Vec<Review>> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            "SELECT * FROM reviews WHERE venue_id = $1 ORDER BY created_at DESC",
        )
        .bind(venue_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        rows.into_iter().map(ReviewRow::into_review).collect()
    }

    async fn adjust_bookmark_count(&self, venue_id: Uuid, delta: i32) -> Result<i32> {
        let count = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE venues SET bookmark_count = GREATEST(0, bookmark_count + $2)
            WHERE id = $1
            RETURNING bookmark_count
            "#,
        )
        .bind(venue_id)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .ok_or_else(|| CatalogError::NotFound(format!("venue {venue_id}")))?;
        Ok(count)
    }
}
