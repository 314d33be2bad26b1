use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, QueryBuilder, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{image_url_for, ClothingItem, ClothingTags, ItemId, UserId};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUser {
    pub user_id: UserId,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct NewItem<'a> {
    pub user_id: &'a UserId,
    pub tags: &'a ClothingTags,
    pub image_hash: &'a str,
    pub image: &'a [u8],
    pub image_mime: &'a str,
}

#[derive(Debug, Clone)]
pub struct StoredImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Exact match on both columns. A wrong password and an unknown username
    /// are indistinguishable to the caller.
    pub async fn find_user_by_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<StoredUser>> {
        let row = sqlx::query("SELECT id, username FROM users WHERE username = ? AND password = ?")
            .bind(username)
            .bind(password)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| StoredUser {
            user_id: UserId(r.get::<String, _>(0)),
            username: r.get::<String, _>(1),
        }))
    }

    pub async fn username_exists(&self, username: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Fails on a duplicate username (unique constraint).
    pub async fn create_user(&self, username: &str, password: &str) -> Result<UserId> {
        let user_id = UserId::generate();
        sqlx::query("INSERT INTO users (id, username, password, created_at) VALUES (?, ?, ?, ?)")
            .bind(user_id.as_str())
            .bind(username)
            .bind(password)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to create user '{username}'"))?;
        Ok(user_id)
    }

    pub async fn insert_item(&self, item: NewItem<'_>) -> Result<ClothingItem> {
        let item_id = ItemId::generate();
        let created_at = Utc::now();
        sqlx::query(
            "INSERT INTO clothing_items (id, user_id, name, category, color, style, warmth, image_hash, image, image_mime, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(item_id.as_str())
        .bind(item.user_id.as_str())
        .bind(&item.tags.name)
        .bind(&item.tags.category)
        .bind(&item.tags.color)
        .bind(&item.tags.style)
        .bind(i64::from(item.tags.warmth))
        .bind(item.image_hash)
        .bind(item.image)
        .bind(item.image_mime)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(ClothingItem {
            image_url: image_url_for(&item_id, item.user_id),
            item_id,
            user_id: item.user_id.clone(),
            name: item.tags.name.clone(),
            category: item.tags.category.clone(),
            color: item.tags.color.clone(),
            style: item.tags.style.clone(),
            warmth: item.tags.warmth,
            created_at,
        })
    }

    /// Newest first.
    pub async fn list_items_for_user(&self, user_id: &UserId) -> Result<Vec<ClothingItem>> {
        let rows = sqlx::query(
            "SELECT id, user_id, name, category, color, style, warmth, created_at
             FROM clothing_items
             WHERE user_id = ?
             ORDER BY rowid DESC",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(item_from_row).collect())
    }

    pub async fn find_item_by_image_hash(
        &self,
        user_id: &UserId,
        image_hash: &str,
    ) -> Result<Option<ClothingItem>> {
        let row = sqlx::query(
            "SELECT id, user_id, name, category, color, style, warmth, created_at
             FROM clothing_items
             WHERE user_id = ? AND image_hash = ?
             LIMIT 1",
        )
        .bind(user_id.as_str())
        .bind(image_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(item_from_row))
    }

    /// Returns whether a row owned by `user_id` was removed.
    pub async fn delete_item(&self, user_id: &UserId, item_id: &ItemId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM clothing_items WHERE user_id = ? AND id = ?")
            .bind(user_id.as_str())
            .bind(item_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes rows whose id is in `item_ids` and whose owner is `user_id`.
    /// Returns the number of rows removed; ids owned by someone else, unknown
    /// ids and repeated ids contribute nothing.
    pub async fn delete_items(&self, user_id: &UserId, item_ids: &[ItemId]) -> Result<u64> {
        if item_ids.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM clothing_items WHERE user_id = ");
        builder.push_bind(user_id.as_str());
        builder.push(" AND id IN (");
        let mut separated = builder.separated(", ");
        for item_id in item_ids {
            separated.push_bind(item_id.as_str());
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    pub async fn load_item_image(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
    ) -> Result<Option<StoredImage>> {
        let row = sqlx::query(
            "SELECT image, image_mime FROM clothing_items WHERE user_id = ? AND id = ?",
        )
        .bind(user_id.as_str())
        .bind(item_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| StoredImage {
            bytes: r.get::<Vec<u8>, _>(0),
            mime_type: r.get::<String, _>(1),
        }))
    }
}

fn item_from_row(r: &SqliteRow) -> ClothingItem {
    let item_id = ItemId(r.get::<String, _>(0));
    let user_id = UserId(r.get::<String, _>(1));
    ClothingItem {
        image_url: image_url_for(&item_id, &user_id),
        item_id,
        user_id,
        name: r.get::<String, _>(2),
        category: r.get::<String, _>(3),
        color: r.get::<String, _>(4),
        style: r.get::<String, _>(5),
        warmth: u8::try_from(r.get::<i64, _>(6)).unwrap_or(u8::MAX),
        created_at: r.get::<DateTime<Utc>, _>(7),
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
