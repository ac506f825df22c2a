//! News articles and Q&A items

use crate::models::{Article, ArticleInput, QaInput, QaItem};
use crate::store::{Database, StoreResult};
use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, OptionalExtension, Row};

const ARTICLE_COLUMNS: &str = "id, slug, title, title_color, title_size, meta_title, meta_description, \
     featured_image, content, content_json, author, category, tags, status, views, created_at, updated_at";

const QA_COLUMNS: &str = "id, page_key, question, answer, is_active, display_order, created_at, updated_at";

fn row_to_article(row: &Row<'_>) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        slug: row.get(1)?,
        title: row.get(2)?,
        title_color: row.get(3)?,
        title_size: row.get(4)?,
        meta_title: row.get(5)?,
        meta_description: row.get(6)?,
        featured_image: row.get(7)?,
        content: row.get(8)?,
        content_json: row.get(9)?,
        author: row.get(10)?,
        category: row.get(11)?,
        tags: row.get(12)?,
        status: row.get(13)?,
        views: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

fn row_to_qa(row: &Row<'_>) -> rusqlite::Result<QaItem> {
    Ok(QaItem {
        id: row.get(0)?,
        page_key: row.get(1)?,
        question: row.get(2)?,
        answer: row.get(3)?,
        is_active: row.get(4)?,
        display_order: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl Database {
    // Articles

    pub fn slug_exists(&self, slug: &str) -> StoreResult<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM articles WHERE slug = ?1",
            params![slug],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Insert an article; `input.slug` must already be unique
    pub fn insert_article(&self, input: &ArticleInput, at: DateTime<Utc>) -> StoreResult<Article> {
        let id = {
            let conn = self.conn();
            conn.execute(
                "INSERT INTO articles (slug, title, title_color, title_size, meta_title, meta_description,
                 featured_image, content, content_json, author, category, tags, status, views, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 0, ?14, ?14)",
                params![
                    input.slug,
                    input.title,
                    input.title_color,
                    input.title_size,
                    input.meta_title,
                    input.meta_description,
                    input.featured_image,
                    input.content,
                    input.content_json,
                    input.author,
                    input.category,
                    input.tags,
                    input.status,
                    at
                ],
            )?;
            conn.last_insert_rowid()
        };
        self.article_by_id(id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    /// Overwrite every editable field of article `id`
    pub fn update_article(&self, id: i64, input: &ArticleInput, at: DateTime<Utc>) -> StoreResult<Option<Article>> {
        let updated = self.conn().execute(
            "UPDATE articles SET slug = ?1, title = ?2, title_color = ?3, title_size = ?4, meta_title = ?5,
             meta_description = ?6, featured_image = ?7, content = ?8, content_json = ?9, author = ?10,
             category = ?11, tags = ?12, status = ?13, updated_at = ?14 WHERE id = ?15",
            params![
                input.slug,
                input.title,
                input.title_color,
                input.title_size,
                input.meta_title,
                input.meta_description,
                input.featured_image,
                input.content,
                input.content_json,
                input.author,
                input.category,
                input.tags,
                input.status,
                at,
                id
            ],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        self.article_by_id(id)
    }

    pub fn article_by_id(&self, id: i64) -> StoreResult<Option<Article>> {
        self.conn()
            .query_row(
                &format!("SELECT {} FROM articles WHERE id = ?1", ARTICLE_COLUMNS),
                params![id],
                row_to_article,
            )
            .optional()
    }

    pub fn article_by_slug(&self, slug: &str) -> StoreResult<Option<Article>> {
        self.conn()
            .query_row(
                &format!("SELECT {} FROM articles WHERE slug = ?1", ARTICLE_COLUMNS),
                params![slug],
                row_to_article,
            )
            .optional()
    }

    pub fn increment_article_views(&self, id: i64) -> StoreResult<()> {
        self.conn()
            .execute("UPDATE articles SET views = views + 1 WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn delete_article(&self, id: i64) -> StoreResult<bool> {
        let removed = self.conn().execute("DELETE FROM articles WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    /// Published articles, newest first
    pub fn published_articles(&self, skip: usize, limit: usize) -> StoreResult<Vec<Article>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM articles WHERE status = 'published'
             ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
            ARTICLE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![limit as i64, skip as i64], row_to_article)?;
        rows.collect()
    }

    /// Newest articles regardless of status
    pub fn latest_articles(&self, limit: usize) -> StoreResult<Vec<Article>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM articles ORDER BY created_at DESC, id DESC LIMIT ?1",
            ARTICLE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![limit as i64], row_to_article)?;
        rows.collect()
    }

    pub fn article_count(&self) -> StoreResult<i64> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))
    }

    // Q&A

    /// Items for a page (plus those shared with "all"), ordered by display
    /// order then most recently updated
    pub fn qa_items(
        &self,
        page_key: Option<&str>,
        active_only: bool,
        skip: usize,
        limit: usize,
    ) -> StoreResult<Vec<QaItem>> {
        let mut sql = format!("SELECT {} FROM qa_items WHERE 1 = 1", QA_COLUMNS);
        let mut args: Vec<&dyn ToSql> = Vec::new();
        if active_only {
            sql.push_str(" AND is_active = 1");
        }
        if let Some(page_key) = page_key.as_ref() {
            sql.push_str(" AND (page_key = ? OR page_key = 'all')");
            args.push(page_key);
        }
        sql.push_str(" ORDER BY display_order ASC, updated_at DESC LIMIT ? OFFSET ?");
        let (limit, skip) = (limit as i64, skip as i64);
        args.push(&limit);
        args.push(&skip);

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(args.as_slice(), row_to_qa)?;
        rows.collect()
    }

    pub fn qa_item(&self, id: i64) -> StoreResult<Option<QaItem>> {
        self.conn()
            .query_row(
                &format!("SELECT {} FROM qa_items WHERE id = ?1", QA_COLUMNS),
                params![id],
                row_to_qa,
            )
            .optional()
    }

    pub fn insert_qa(&self, input: &QaInput, at: DateTime<Utc>) -> StoreResult<QaItem> {
        let id = {
            let conn = self.conn();
            conn.execute(
                "INSERT INTO qa_items (page_key, question, answer, is_active, display_order, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![input.page_key, input.question, input.answer, input.is_active, input.display_order, at],
            )?;
            conn.last_insert_rowid()
        };
        self.qa_item(id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    pub fn update_qa(&self, id: i64, input: &QaInput, at: DateTime<Utc>) -> StoreResult<Option<QaItem>> {
        let updated = self.conn().execute(
            "UPDATE qa_items SET page_key = ?1, question = ?2, answer = ?3, is_active = ?4,
             display_order = ?5, updated_at = ?6 WHERE id = ?7",
            params![input.page_key, input.question, input.answer, input.is_active, input.display_order, at, id],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        self.qa_item(id)
    }

    pub fn delete_qa(&self, id: i64) -> StoreResult<bool> {
        let removed = self.conn().execute("DELETE FROM qa_items WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn article(slug: &str, status: &str) -> ArticleInput {
        let mut input: ArticleInput =
            serde_json::from_str(r#"{"title": "Gold climbs", "content": "<p>Body</p>"}"#).unwrap();
        input.slug = slug.to_string();
        input.status = Some(status.to_string());
        input
    }

    fn qa(page: &str, order: i64, active: bool) -> QaInput {
        QaInput {
            page_key: page.to_string(),
            question: format!("q-{}-{}", page, order),
            answer: "a".to_string(),
            is_active: active,
            display_order: order,
        }
    }

    #[test]
    fn test_article_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let created = db.insert_article(&article("gold-climbs", "published"), now).unwrap();
        db.insert_article(&article("draft", "draft"), now + Duration::seconds(1)).unwrap();

        assert!(db.slug_exists("gold-climbs").unwrap());
        assert_eq!(db.published_articles(0, 10).unwrap().len(), 1);
        assert_eq!(db.latest_articles(10).unwrap()[0].slug, "draft");

        db.increment_article_views(created.id).unwrap();
        assert_eq!(db.article_by_slug("gold-climbs").unwrap().unwrap().views, 1);

        let mut edit = article("gold-climbs", "published");
        edit.title = "Gold climbs again".to_string();
        let updated = db.update_article(created.id, &edit, now).unwrap().unwrap();
        assert_eq!(updated.title, "Gold climbs again");
        assert!(db.update_article(9999, &edit, now).unwrap().is_none());

        assert!(db.delete_article(created.id).unwrap());
        assert_eq!(db.article_count().unwrap(), 1);
    }

    #[test]
    fn test_qa_filters_and_ordering() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.insert_qa(&qa("home", 2, true), now).unwrap();
        db.insert_qa(&qa("all", 1, true), now).unwrap();
        db.insert_qa(&qa("silver", 0, true), now).unwrap();
        db.insert_qa(&qa("home", 0, false), now).unwrap();

        let home = db.qa_items(Some("home"), true, 0, 100).unwrap();
        let questions: Vec<&str> = home.iter().map(|q| q.question.as_str()).collect();
        assert_eq!(questions, vec!["q-all-1", "q-home-2"]);

        assert_eq!(db.qa_items(Some("home"), false, 0, 100).unwrap().len(), 3);
        assert_eq!(db.qa_items(None, true, 1, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_qa_update_and_delete() {
        let db = Database::open_in_memory().unwrap();
        let item = db.insert_qa(&qa("home", 0, true), Utc::now()).unwrap();

        let mut edit = qa("gold", 5, false);
        edit.answer = "updated".to_string();
        let updated = db.update_qa(item.id, &edit, Utc::now()).unwrap().unwrap();
        assert_eq!(updated.page_key, "gold");
        assert!(!updated.is_active);

        assert!(db.delete_qa(item.id).unwrap());
        assert!(!db.delete_qa(item.id).unwrap());
        assert!(db.update_qa(item.id, &edit, Utc::now()).unwrap().is_none());
    }
}
