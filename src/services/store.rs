//! 帖子存储服务 - 业务能力层
//!
//! 负责"查、插、修"三个能力和好/坏记录的判定。
//! id 上有唯一索引，并发插入的冲突在这里吸收掉，
//! 不向抓取循环传播。

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::warn;

use crate::error::{AppResult, StoreError};
use crate::models::StoredPost;

/// 记录判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// 记录完整，跳过重抓
    Good,
    /// 记录是空壳或残缺，允许重抓修复
    Bad,
}

/// 写入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Skipped,
}

/// 文档头部的元数据键，判定"有没有内容"时排除
const META_KEYS: [&str; 4] = ["id", "fetchedAt", "inspection_status", "details_status"];

/// 判定一条记录好/坏
///
/// 两个状态字段都是 null/0 且没有任何业务内容的记录是坏的，
/// 其余都算好。每次查询现算，不缓存判定结果。
pub fn classify(post: &StoredPost) -> Verdict {
    let status_missing = |s: Option<i64>| matches!(s, None | Some(0));
    let both_statuses_missing =
        status_missing(post.inspection_status) && status_missing(post.details_status);

    if both_statuses_missing && !has_payload(&post.doc) {
        return Verdict::Bad;
    }
    Verdict::Good
}

/// 文档里是否有任何业务内容
///
/// null、false、空字符串、空数组都不算内容：
/// 失败抓取产出的空壳文档全部由这些值构成。
fn has_payload(doc: &JsonValue) -> bool {
    let Some(map) = doc.as_object() else {
        return false;
    };
    map.iter()
        .filter(|(k, _)| !META_KEYS.contains(&k.as_str()))
        .any(|(_, v)| match v {
            JsonValue::Null => false,
            JsonValue::Bool(b) => *b,
            JsonValue::String(s) => !s.trim().is_empty(),
            JsonValue::Array(a) => !a.is_empty(),
            _ => true,
        })
}

/// 帖子存储
///
/// 抓取循环只通过这个 trait 访问持久层，
/// 测试时用内存假实现替换。
#[async_trait]
pub trait PostStore: Send + Sync {
    /// 按 id 查记录
    async fn find_by_id(&self, id: i64) -> Result<Option<StoredPost>, StoreError>;

    /// 插入新记录，id 已存在时返回 `DuplicateKey`
    async fn insert(&self, id: i64, doc: &JsonValue) -> Result<(), StoreError>;

    /// 原地替换记录内容；目标行不存在时改为插入，返回 true
    async fn update_by_id(&self, id: i64, doc: &JsonValue) -> Result<bool, StoreError>;
}

/// 是否已经有一条"好"记录
///
/// 只有记录存在且判定为好才返回 true；
/// 存在但残缺的记录返回 false，让上层重抓修复。
pub async fn already_have_good<S: PostStore + ?Sized>(
    store: &S,
    id: i64,
) -> Result<bool, StoreError> {
    let existing = store.find_by_id(id).await?;
    Ok(matches!(existing.map(|p| classify(&p)), Some(Verdict::Good)))
}

/// 插入或修复一条记录
///
/// - 不存在 → 插入；并发写入撞上唯一索引时落到修复路径，不报错
/// - 存在且好 → 跳过，不用重抓的数据覆盖好记录
/// - 存在且坏 → 原地修复；修复本身变成了插入（与并发删除竞争）则按插入上报
pub async fn upsert_post<S: PostStore + ?Sized>(
    store: &S,
    id: i64,
    doc: &JsonValue,
) -> Result<UpsertOutcome, StoreError> {
    let existing = store.find_by_id(id).await?;

    if existing.is_none() {
        match store.insert(id, doc).await {
            Ok(()) => return Ok(UpsertOutcome::Inserted),
            // 另一个写入方刚插进去了，落到修复路径
            Err(StoreError::DuplicateKey { .. }) => {
                warn!("insert 撞上唯一索引 id={}，转为修复路径", id);
            }
            Err(e) => return Err(e),
        }
    }

    if let Some(ex) = &existing {
        if classify(ex) == Verdict::Good {
            return Ok(UpsertOutcome::Skipped);
        }
    }

    let upserted = store.update_by_id(id, doc).await?;
    if upserted {
        Ok(UpsertOutcome::Inserted)
    } else {
        Ok(UpsertOutcome::Updated)
    }
}

/// SQLite 实现
///
/// 整个文档作为 JSON 存在 doc 列，两个状态字段和抓取时间
/// 单独提列，查询和判定不用每次解析整个文档。
pub struct SqlitePostStore {
    pool: SqlitePool,
}

impl SqlitePostStore {
    /// 连接并初始化表结构
    pub async fn connect(database_url: &str) -> AppResult<Self> {
        // sqlite 不会自己创建文件
        let db_path = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");
        if !db_path.is_empty() && db_path != ":memory:" && !Path::new(db_path).exists() {
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| StoreError::ConnectionFailed {
                        url: database_url.to_string(),
                        source: Box::new(e),
                    })?;
                }
            }
            std::fs::File::create(db_path).map_err(|e| StoreError::ConnectionFailed {
                url: database_url.to_string(),
                source: Box::new(e),
            })?;
        }

        // 单任务写入，一条连接就够；内存库多连接会各开各的库
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::ConnectionFailed {
                url: database_url.to_string(),
                source: Box::new(e),
            })?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER NOT NULL,
                fetched_at TEXT,
                inspection_status INTEGER,
                details_status INTEGER,
                doc TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed { source: Box::new(e) })?;

        sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS uniq_id ON posts(id)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed { source: Box::new(e) })?;

        Ok(())
    }
}

/// 从完整文档里取出要单独提列的小字段
fn doc_columns(doc: &JsonValue) -> (Option<String>, Option<i64>, Option<i64>) {
    let fetched_at = doc
        .get("fetchedAt")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let inspection_status = doc.get("inspection_status").and_then(|v| v.as_i64());
    let details_status = doc.get("details_status").and_then(|v| v.as_i64());
    (fetched_at, inspection_status, details_status)
}

#[async_trait]
impl PostStore for SqlitePostStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<StoredPost>, StoreError> {
        let row = sqlx::query(
            "SELECT id, fetched_at, inspection_status, details_status, doc FROM posts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed { source: Box::new(e) })?;

        let Some(row) = row else {
            return Ok(None);
        };

        let doc_text: String = row.get("doc");
        let doc = serde_json::from_str(&doc_text).unwrap_or(JsonValue::Null);

        Ok(Some(StoredPost {
            id: row.get("id"),
            fetched_at: row.get::<Option<String>, _>("fetched_at").unwrap_or_default(),
            inspection_status: row.get("inspection_status"),
            details_status: row.get("details_status"),
            doc,
        }))
    }

    async fn insert(&self, id: i64, doc: &JsonValue) -> Result<(), StoreError> {
        let (fetched_at, inspection_status, details_status) = doc_columns(doc);

        sqlx::query(
            r#"
            INSERT INTO posts (id, fetched_at, inspection_status, details_status, doc)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(fetched_at)
        .bind(inspection_status)
        .bind(details_status)
        .bind(doc.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx(id, e))?;

        Ok(())
    }

    async fn update_by_id(&self, id: i64, doc: &JsonValue) -> Result<bool, StoreError> {
        let (fetched_at, inspection_status, details_status) = doc_columns(doc);

        let result = sqlx::query(
            r#"
            UPDATE posts
            SET fetched_at = ?, inspection_status = ?, details_status = ?, doc = ?
            WHERE id = ?
            "#,
        )
        .bind(&fetched_at)
        .bind(inspection_status)
        .bind(details_status)
        .bind(doc.to_string())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed { source: Box::new(e) })?;

        if result.rows_affected() > 0 {
            return Ok(false);
        }

        // 目标行不在了（与并发删除竞争），改为插入
        match self.insert(id, doc).await {
            Ok(()) => Ok(true),
            // 又被别人先插了一步，重做一次替换
            Err(StoreError::DuplicateKey { .. }) => {
                sqlx::query(
                    r#"
                    UPDATE posts
                    SET fetched_at = ?, inspection_status = ?, details_status = ?, doc = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&fetched_at)
                .bind(inspection_status)
                .bind(details_status)
                .bind(doc.to_string())
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::QueryFailed { source: Box::new(e) })?;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::MemoryStore;
    use super::*;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn good_doc(id: i64) -> JsonValue {
        json!({
            "id": id,
            "fetchedAt": "2025-01-01T00:00:00Z",
            "inspection_status": 200,
            "details_status": 200,
            "title": "تويوتا كامري 2020",
            "brand": "Toyota"
        })
    }

    fn empty_shell_doc(id: i64) -> JsonValue {
        json!({
            "id": id,
            "fetchedAt": "2025-01-01T00:00:00Z",
            "inspection_status": 0,
            "details_status": 0,
            "title": null,
            "brand": null,
            "body_is_clear": false,
            "images": [],
            "tags": []
        })
    }

    fn stored(doc: &JsonValue) -> StoredPost {
        StoredPost {
            id: doc["id"].as_i64().unwrap(),
            fetched_at: String::new(),
            inspection_status: doc["inspection_status"].as_i64(),
            details_status: doc["details_status"].as_i64(),
            doc: doc.clone(),
        }
    }

    #[test]
    fn empty_shell_classifies_bad() {
        assert_eq!(classify(&stored(&empty_shell_doc(1))), Verdict::Bad);
    }

    #[test]
    fn record_with_status_classifies_good() {
        assert_eq!(classify(&stored(&good_doc(1))), Verdict::Good);
    }

    #[test]
    fn record_with_payload_but_no_status_classifies_good() {
        let mut doc = good_doc(1);
        doc["inspection_status"] = json!(0);
        doc["details_status"] = json!(null);
        assert_eq!(classify(&stored(&doc)), Verdict::Good);
    }

    #[tokio::test]
    async fn upsert_is_idempotent_for_good_records() {
        let store = MemoryStore::new();
        let doc = good_doc(42);

        assert_eq!(
            upsert_post(&store, 42, &doc).await.unwrap(),
            UpsertOutcome::Inserted
        );
        // 同样的好数据再来一遍只能是跳过，不产生第二次写入
        assert_eq!(
            upsert_post(&store, 42, &doc).await.unwrap(),
            UpsertOutcome::Skipped
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn bad_record_is_repaired_in_place() {
        let store = MemoryStore::new();

        upsert_post(&store, 7, &empty_shell_doc(7)).await.unwrap();
        assert!(!already_have_good(&store, 7).await.unwrap());

        assert_eq!(
            upsert_post(&store, 7, &good_doc(7)).await.unwrap(),
            UpsertOutcome::Updated
        );
        assert!(already_have_good(&store, 7).await.unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_insert_race_falls_back_to_update() {
        let store = MemoryStore::new();
        // 另一个写入方已经插入了这条记录
        store.insert(9, &empty_shell_doc(9)).await.unwrap();
        // 但本方的 find 读到的是插入前的快照
        store.pretend_absent_once.store(true, Ordering::SeqCst);

        let outcome = upsert_post(&store, 9, &good_doc(9)).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn already_have_good_requires_existing_and_good() {
        let store = MemoryStore::new();
        assert!(!already_have_good(&store, 1).await.unwrap());

        store.insert(1, &empty_shell_doc(1)).await.unwrap();
        assert!(!already_have_good(&store, 1).await.unwrap());

        store.update_by_id(1, &good_doc(1)).await.unwrap();
        assert!(already_have_good(&store, 1).await.unwrap());
    }

    #[tokio::test]
    async fn sqlite_store_roundtrip() {
        let store = SqlitePostStore::connect("sqlite::memory:").await.unwrap();

        store.insert(5, &good_doc(5)).await.unwrap();
        let found = store.find_by_id(5).await.unwrap().unwrap();
        assert_eq!(found.id, 5);
        assert_eq!(found.details_status, Some(200));
        assert_eq!(found.doc["brand"], json!("Toyota"));

        // 唯一索引
        let dup = store.insert(5, &good_doc(5)).await;
        assert!(matches!(dup, Err(StoreError::DuplicateKey { id: 5 })));

        // 替换不改变行数
        let upserted = store.update_by_id(5, &empty_shell_doc(5)).await.unwrap();
        assert!(!upserted);

        // 目标行不存在时替换变成插入
        let upserted = store.update_by_id(6, &good_doc(6)).await.unwrap();
        assert!(upserted);
    }
}
