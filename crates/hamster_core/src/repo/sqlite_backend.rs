//! SQLite implementation of `FactBackend`.
//!
//! # Responsibility
//! - Store facts with their activity, category and ordered tags.
//! - Resolve activity/category/tag names to rows, creating them on demand.
//! - Map store transactions onto SQLite `BEGIN`/`COMMIT`/`ROLLBACK`.
//!
//! # Invariants
//! - Category and activity names are matched case-insensitively on the
//!   trimmed name (`search_name`).
//! - Activities still referenced by facts are soft-deleted, never dropped.
//! - Adding a non-temporary fact closes any open fact that started earlier.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::migrations::latest_version;
use crate::model::fact::{Fact, FactId};
use crate::repo::fact_backend::{
    Activity, ActivityId, Category, CategoryId, FactBackend, RepoError, RepoResult, Tag, TagId,
    TransactionOutcome,
};
use chrono::NaiveDateTime;
use log::{debug, warn};
use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;

const FACT_SELECT_SQL: &str = "SELECT
    f.id AS id,
    f.start_time AS start_time,
    f.end_time AS end_time,
    f.description AS description,
    a.name AS activity,
    c.name AS category
FROM facts f
JOIN activities a ON a.id = f.activity_id
LEFT JOIN categories c ON c.id = a.category_id";

const ACTIVITY_SELECT_SQL: &str = "SELECT
    a.id AS id,
    a.name AS name,
    a.category_id AS category_id,
    c.name AS category,
    a.deleted AS deleted
FROM activities a
LEFT JOIN categories c ON c.id = a.category_id";

const TERM_FILTER_SQL: &str = " AND (
    lower(a.name) LIKE ?
    OR lower(coalesce(c.name, '')) LIKE ?
    OR lower(coalesce(f.description, '')) LIKE ?
    OR EXISTS (
        SELECT 1
        FROM fact_tags ft
        JOIN tags t ON t.id = ft.tag_id
        WHERE ft.fact_id = f.id AND lower(t.name) LIKE ?
    )
)";

/// SQLite-backed fact storage.
pub struct SqliteFactBackend<'conn> {
    conn: &'conn Connection,
    in_transaction: bool,
}

impl<'conn> SqliteFactBackend<'conn> {
    /// Wraps a connection opened through `db::open_db*`.
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations were not applied.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let actual_version: u32 =
            conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        let expected_version = latest_version();
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self {
            conn,
            in_transaction: false,
        })
    }

    fn ensure_category(&mut self, name: &str) -> RepoResult<CategoryId> {
        match self.get_category_id(name)? {
            Some(id) => Ok(id),
            None => self.add_category(name),
        }
    }

    fn ensure_activity(
        &mut self,
        name: &str,
        category_id: Option<CategoryId>,
    ) -> RepoResult<ActivityId> {
        match self.get_activity_by_name(name, category_id, true)? {
            Some(activity) => Ok(activity.id),
            None => self.add_activity(name, category_id),
        }
    }

    fn close_open_facts_before(&self, start: NaiveDateTime) -> RepoResult<()> {
        let closed = self.conn.execute(
            "UPDATE facts
             SET end_time = ?1
             WHERE end_time IS NULL
               AND start_time < ?1;",
            params![start],
        )?;
        if closed > 0 {
            debug!("event=fact_auto_close module=repo status=ok closed={closed}");
        }
        Ok(())
    }

    fn link_tags(&mut self, fact_id: FactId, names: &[String]) -> RepoResult<()> {
        if names.is_empty() {
            return Ok(());
        }
        let (tags, _) = self.get_tag_ids(names)?;
        let mut stmt = self.conn.prepare(
            "INSERT INTO fact_tags (fact_id, tag_id, position) VALUES (?1, ?2, ?3);",
        )?;
        for (position, tag) in tags.iter().enumerate() {
            stmt.execute(params![fact_id, tag.id, position as i64])?;
        }
        Ok(())
    }

    fn load_tags(&self, fact_id: FactId) -> RepoResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.name
             FROM fact_tags ft
             JOIN tags t ON t.id = ft.tag_id
             WHERE ft.fact_id = ?1
             ORDER BY ft.position ASC;",
        )?;
        let names = stmt
            .query_map([fact_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn find_tag(&self, name: &str) -> RepoResult<Option<Tag>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, autocomplete FROM tags WHERE name = ?1;")?;
        let mut rows = stmt.query([name])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_tag_row(row)?)),
            None => Ok(None),
        }
    }

    fn query_activities(&self, sql: &str, binds: &[&dyn ToSql]) -> RepoResult<Vec<Activity>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(binds)?;
        let mut activities = Vec::new();
        while let Some(row) = rows.next()? {
            activities.push(parse_activity_row(row)?);
        }
        Ok(activities)
    }
}

impl FactBackend for SqliteFactBackend<'_> {
    fn start_transaction(&mut self) -> RepoResult<()> {
        if self.in_transaction {
            return Err(RepoError::TransactionActive);
        }
        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        self.in_transaction = true;
        Ok(())
    }

    fn end_transaction(&mut self, outcome: TransactionOutcome) -> RepoResult<()> {
        if !self.in_transaction {
            return Err(RepoError::NoActiveTransaction);
        }
        self.in_transaction = false;
        let result = match outcome {
            TransactionOutcome::Commit => self.conn.execute_batch("COMMIT;"),
            TransactionOutcome::Rollback => self.conn.execute_batch("ROLLBACK;"),
        };
        if let Err(err) = result {
            warn!(
                "event=db_transaction module=repo status=error outcome={outcome:?} error={err}"
            );
            if !self.conn.is_autocommit() {
                if let Err(rollback_err) = self.conn.execute_batch("ROLLBACK;") {
                    warn!(
                        "event=db_transaction module=repo status=error error_code=rollback_failed error={rollback_err}"
                    );
                }
            }
            return Err(err.into());
        }
        Ok(())
    }

    fn add_fact(&mut self, fact: &Fact, temporary: bool) -> RepoResult<Option<FactId>> {
        let activity = fact.activity.as_deref().map(str::trim).unwrap_or_default();
        let Some(start) = fact.start_time.filter(|_| !activity.is_empty()) else {
            return Ok(None);
        };

        let category_id = match fact.category.as_deref() {
            Some(category) => Some(self.ensure_category(category)?),
            None => None,
        };
        let activity_id = self.ensure_activity(activity, category_id)?;

        if !temporary {
            self.close_open_facts_before(start)?;
        }

        self.conn.execute(
            "INSERT INTO facts (activity_id, start_time, end_time, description, temporary)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                activity_id,
                start,
                fact.end_time,
                fact.description.as_deref(),
                bool_to_int(temporary),
            ],
        )?;
        let fact_id = self.conn.last_insert_rowid();
        self.link_tags(fact_id, &fact.tags)?;

        Ok(Some(fact_id))
    }

    fn get_fact(&self, id: FactId) -> RepoResult<Option<Fact>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{FACT_SELECT_SQL} WHERE f.id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let mut fact = parse_fact_row(row)?;
        fact.tags = self.load_tags(id)?;
        Ok(Some(fact))
    }

    fn remove_fact(&mut self, id: FactId) -> RepoResult<()> {
        self.conn
            .execute("DELETE FROM fact_tags WHERE fact_id = ?1;", [id])?;
        let changed = self.conn.execute("DELETE FROM facts WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::NotFound { entity: "fact", id });
        }
        Ok(())
    }

    fn touch_fact(&mut self, id: FactId, end_time: NaiveDateTime) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE facts SET end_time = ?2 WHERE id = ?1;",
            params![id, end_time],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound { entity: "fact", id });
        }
        Ok(())
    }

    fn get_facts(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
        search_terms: &str,
    ) -> RepoResult<Vec<Fact>> {
        let mut sql = format!("{FACT_SELECT_SQL} WHERE f.start_time >= ? AND f.start_time < ?");
        let mut binds: Vec<Box<dyn ToSql>> = vec![Box::new(from), Box::new(to)];

        for term in search_terms.split_whitespace() {
            sql.push_str(TERM_FILTER_SQL);
            let pattern = format!("%{}%", term.to_lowercase());
            for _ in 0..4 {
                binds.push(Box::new(pattern.clone()));
            }
        }
        sql.push_str(" ORDER BY f.start_time ASC, f.id ASC;");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds.iter()))?;
        let mut facts = Vec::new();
        while let Some(row) = rows.next()? {
            facts.push(parse_fact_row(row)?);
        }
        drop(rows);

        for fact in &mut facts {
            if let Some(id) = fact.id {
                fact.tags = self.load_tags(id)?;
            }
        }
        Ok(facts)
    }

    fn add_category(&mut self, name: &str) -> RepoResult<CategoryId> {
        let name = name.trim();
        if let Some(id) = self.get_category_id(name)? {
            return Ok(id);
        }
        self.conn.execute(
            "INSERT INTO categories (name, search_name) VALUES (?1, ?2);",
            params![name, search_name(name)],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_category_id(&self, name: &str) -> RepoResult<Option<CategoryId>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM categories WHERE search_name = ?1;",
                [search_name(name)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn update_category(&mut self, id: CategoryId, name: &str) -> RepoResult<()> {
        let name = name.trim();
        let changed = self.conn.execute(
            "UPDATE categories SET name = ?2, search_name = ?3 WHERE id = ?1;",
            params![id, name, search_name(name)],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "category",
                id,
            });
        }
        Ok(())
    }

    fn remove_category(&mut self, id: CategoryId) -> RepoResult<()> {
        self.conn.execute(
            "UPDATE activities SET category_id = NULL WHERE category_id = ?1;",
            [id],
        )?;
        let changed = self
            .conn
            .execute("DELETE FROM categories WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "category",
                id,
            });
        }
        Ok(())
    }

    fn get_categories(&self) -> RepoResult<Vec<Category>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM categories ORDER BY search_name ASC, id ASC;")?;
        let categories = stmt
            .query_map([], |row| {
                Ok(Category {
                    id: row.get("id")?,
                    name: row.get("name")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    fn add_activity(
        &mut self,
        name: &str,
        category_id: Option<CategoryId>,
    ) -> RepoResult<ActivityId> {
        let name = name.trim();
        self.conn.execute(
            "INSERT INTO activities (name, search_name, category_id) VALUES (?1, ?2, ?3);",
            params![name, search_name(name), category_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_activity(
        &mut self,
        id: ActivityId,
        name: &str,
        category_id: Option<CategoryId>,
    ) -> RepoResult<()> {
        let name = name.trim();
        let changed = self.conn.execute(
            "UPDATE activities
             SET name = ?2, search_name = ?3, category_id = ?4
             WHERE id = ?1;",
            params![id, name, search_name(name), category_id],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "activity",
                id,
            });
        }
        Ok(())
    }

    fn remove_activity(&mut self, id: ActivityId) -> RepoResult<()> {
        let referenced: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM facts WHERE activity_id = ?1);",
            [id],
            |row| row.get(0),
        )?;
        let changed = if referenced {
            self.conn
                .execute("UPDATE activities SET deleted = 1 WHERE id = ?1;", [id])?
        } else {
            self.conn
                .execute("DELETE FROM activities WHERE id = ?1;", [id])?
        };
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "activity",
                id,
            });
        }
        Ok(())
    }

    fn get_category_activities(
        &self,
        category_id: Option<CategoryId>,
    ) -> RepoResult<Vec<Activity>> {
        self.query_activities(
            &format!(
                "{ACTIVITY_SELECT_SQL}
                 WHERE a.deleted = 0 AND a.category_id IS ?1
                 ORDER BY a.search_name ASC, a.id ASC;"
            ),
            &[&category_id],
        )
    }

    fn get_activities(&self, search: &str) -> RepoResult<Vec<Activity>> {
        let pattern = format!("%{}%", search_name(search));
        self.query_activities(
            &format!(
                "{ACTIVITY_SELECT_SQL}
                 WHERE a.deleted = 0 AND a.search_name LIKE ?1
                 ORDER BY a.search_name ASC, a.id ASC;"
            ),
            &[&pattern],
        )
    }

    fn change_category(
        &mut self,
        id: ActivityId,
        category_id: Option<CategoryId>,
    ) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE activities SET category_id = ?2 WHERE id = ?1 AND category_id IS NOT ?2;",
            params![id, category_id],
        )?;
        Ok(changed > 0)
    }

    fn get_activity_by_name(
        &mut self,
        name: &str,
        category_id: Option<CategoryId>,
        resurrect: bool,
    ) -> RepoResult<Option<Activity>> {
        let found = self.query_activities(
            &format!(
                "{ACTIVITY_SELECT_SQL}
                 WHERE a.search_name = ?1 AND a.category_id IS ?2
                 ORDER BY a.deleted ASC, a.id ASC
                 LIMIT 1;"
            ),
            &[&search_name(name), &category_id],
        )?;
        let Some(mut activity) = found.into_iter().next() else {
            return Ok(None);
        };

        if activity.deleted && resurrect {
            self.conn.execute(
                "UPDATE activities SET deleted = 0 WHERE id = ?1;",
                [activity.id],
            )?;
            activity.deleted = false;
        }
        Ok(Some(activity))
    }

    fn get_tags(&self, only_autocomplete: bool) -> RepoResult<Vec<Tag>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, autocomplete
             FROM tags
             WHERE (?1 = 0 OR autocomplete = 1)
             ORDER BY name ASC;",
        )?;
        let mut rows = stmt.query([bool_to_int(only_autocomplete)])?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            tags.push(parse_tag_row(row)?);
        }
        Ok(tags)
    }

    fn get_tag_ids(&mut self, names: &[String]) -> RepoResult<(Vec<Tag>, bool)> {
        let mut tags = Vec::with_capacity(names.len());
        let mut created = false;
        for name in names.iter().map(|name| name.trim()).filter(|name| !name.is_empty()) {
            let tag = match self.find_tag(name)? {
                Some(tag) => tag,
                None => {
                    self.conn
                        .execute("INSERT INTO tags (name) VALUES (?1);", [name])?;
                    created = true;
                    Tag {
                        id: self.conn.last_insert_rowid(),
                        name: name.to_string(),
                        autocomplete: true,
                    }
                }
            };
            tags.push(tag);
        }
        Ok((tags, created))
    }

    fn update_autocomplete_tags(&mut self, names: &[String]) -> RepoResult<bool> {
        let (_, mut changed) = self.get_tag_ids(names)?;
        let wanted: BTreeSet<&str> = names.iter().map(|name| name.trim()).collect();

        let mut flips: Vec<(TagId, bool)> = Vec::new();
        for tag in self.get_tags(false)? {
            let autocomplete = wanted.contains(tag.name.as_str());
            if tag.autocomplete != autocomplete {
                flips.push((tag.id, autocomplete));
            }
        }
        for (id, autocomplete) in flips {
            self.conn.execute(
                "UPDATE tags SET autocomplete = ?2 WHERE id = ?1;",
                params![id, bool_to_int(autocomplete)],
            )?;
            changed = true;
        }
        Ok(changed)
    }
}

fn parse_fact_row(row: &Row<'_>) -> RepoResult<Fact> {
    let id: FactId = row.get("id")?;
    let activity: String = row.get("activity")?;
    if activity.trim().is_empty() {
        return Err(RepoError::InvalidData(format!(
            "fact {id} references an activity with an empty name"
        )));
    }

    Ok(Fact {
        id: Some(id),
        activity: Some(activity),
        category: row.get("category")?,
        description: row.get("description")?,
        tags: Vec::new(),
        start_time: Some(row.get("start_time")?),
        end_time: row.get("end_time")?,
    })
}

fn parse_activity_row(row: &Row<'_>) -> RepoResult<Activity> {
    Ok(Activity {
        id: row.get("id")?,
        name: row.get("name")?,
        category_id: row.get("category_id")?,
        category: row.get("category")?,
        deleted: int_to_bool(row.get("deleted")?, "activities.deleted")?,
    })
}

fn parse_tag_row(row: &Row<'_>) -> RepoResult<Tag> {
    Ok(Tag {
        id: row.get("id")?,
        name: row.get("name")?,
        autocomplete: int_to_bool(row.get("autocomplete")?, "tags.autocomplete")?,
    })
}

fn search_name(name: &str) -> String {
    name.trim().to_lowercase()
}

fn int_to_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
