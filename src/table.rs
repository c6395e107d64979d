//! Table operations.
//!
//! A [`Table`] borrows its session mutably, so statements of one session
//! never interleave.

use crate::core::db::{ColumnDescriptor, ColumnSpec, Find, IndexSpec, JoinSlot, RowDecoder};
use crate::core::sql::{Filter, JoinKind};
use crate::core::value::{Row, Value};
use crate::core::{MapperError, Result};
use crate::session::Session;
use tracing::debug;

pub struct Table<'s> {
    session: &'s mut Session,
    name: String,
}

impl<'s> Table<'s> {
    pub(crate) fn new(session: &'s mut Session, name: &str) -> Self {
        Table {
            session,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn describe(&mut self) -> Result<Vec<ColumnDescriptor>> {
        self.session.describe(&self.name)
    }

    pub fn get_column(&mut self, column: &str) -> Result<Option<ColumnDescriptor>> {
        Ok(self.describe()?.into_iter().find(|c| c.name == column))
    }

    pub fn primary_key(&mut self) -> Result<Option<String>> {
        self.session.primary_key(&self.name)
    }

    /// Inserts one row and returns the id the database generated for it.
    ///
    /// No data inserts a row of defaults.
    pub fn insert<K, V, I>(&mut self, data: I) -> Result<Option<i64>>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let data = pairs(data);
        let statement = self.session.dialect().query_builder().insert(&self.name, &data)?;
        let result = self.session.run(&statement)?;
        if result.rowcount != 1 {
            return Err(MapperError::Query(format!(
                "insert into `{}` affected {} rows",
                self.name, result.rowcount
            )));
        }
        Ok(result.last_insert_id)
    }

    /// Selects rows, decoding a join into a nested row under its alias.
    pub fn find(&mut self, find: Find) -> Result<Vec<Row>> {
        let join = find.join_spec()?;
        let decoder = match &join {
            Some(spec) => {
                let null_key = match spec.kind {
                    JoinKind::Left => self.session.primary_key(&spec.target_table)?,
                    JoinKind::Inner => None,
                };
                RowDecoder::with_slots(vec![JoinSlot {
                    alias: spec.alias.clone(),
                    null_key,
                }])
            }
            None => RowDecoder::plain(),
        };
        let filter = self.session.compile(&self.name, &find.filter)?;
        let statement = self
            .session
            .dialect()
            .query_builder()
            .select(&self.name, filter, &find, join.as_ref())?;
        let result = self.session.run(&statement)?;
        decoder.decode_all(result)
    }

    /// `find` limited to one row.
    pub fn find_one(&mut self, find: Find) -> Result<Option<Row>> {
        Ok(self.find(find.limit(1))?.into_iter().next())
    }

    /// The row matching `filter`, usually a primary-key value.
    pub fn get(&mut self, filter: impl Into<Filter>) -> Result<Option<Row>> {
        self.find_one(Find::new().filter(filter))
    }

    pub fn count(&mut self, filter: impl Into<Filter>) -> Result<i64> {
        let filter = self.session.compile(&self.name, &filter.into())?;
        let statement = self.session.dialect().query_builder().count(&self.name, filter)?;
        let result = self.session.run(&statement)?;
        result
            .scalar()
            .and_then(Value::as_i64)
            .ok_or_else(|| MapperError::Query("COUNT(*) returned no number".to_string()))
    }

    /// Updates matching rows and returns how many the database reports changed.
    pub fn update<K, V, I>(&mut self, filter: impl Into<Filter>, set: I) -> Result<u64>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.update_limited(filter.into(), pairs(set), None)
    }

    /// Updates at most one matching row; only where the dialect accepts `UPDATE ... LIMIT`.
    pub fn update_one<K, V, I>(&mut self, filter: impl Into<Filter>, set: I) -> Result<u64>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        if !self.session.dialect().supports_update_limit() {
            return Err(MapperError::Unsupported(format!(
                "update_one is not available on {}",
                self.session.dialect().kind()
            )));
        }
        self.update_limited(filter.into(), pairs(set), Some(1))
    }

    fn update_limited(
        &mut self,
        filter: Filter,
        set: Vec<(String, Value)>,
        limit: Option<u64>,
    ) -> Result<u64> {
        let filter = self.session.compile(&self.name, &filter)?;
        let statement = self
            .session
            .dialect()
            .query_builder()
            .update(&self.name, filter, &set, limit)?;
        Ok(self.session.run(&statement)?.rowcount.max(0) as u64)
    }

    pub fn delete(&mut self, filter: impl Into<Filter>) -> Result<u64> {
        let filter = self.session.compile(&self.name, &filter.into())?;
        let statement = self.session.dialect().query_builder().delete(&self.name, filter)?;
        Ok(self.session.run(&statement)?.rowcount.max(0) as u64)
    }

    pub fn drop(&mut self, if_exists: bool) -> Result<()> {
        let statement = self.session.dialect().query_builder().drop(&self.name, if_exists)?;
        self.session.run_ddl(&self.name, &statement.sql)
    }

    /// Adds a column, creating the table when it does not exist yet.
    ///
    /// # Returns
    ///
    /// `true` when DDL ran, `false` when `exists_ok` found the column present.
    pub fn add_column(&mut self, spec: ColumnSpec) -> Result<bool> {
        let spec = spec.validated()?;
        let statements = if self.session.has_table(&self.name)? {
            if spec.exists_ok && self.get_column(&spec.name)?.is_some() {
                debug!(table = %self.name, column = %spec.name, "column exists");
                return Ok(false);
            }
            self.session.dialect().add_column(&self.name, &spec)?
        } else {
            self.session.dialect().create_table(&self.name, &spec)?
        };
        for sql in &statements {
            self.session.run_ddl(&self.name, sql)?;
        }
        Ok(true)
    }

    /// Creates an index.
    ///
    /// # Returns
    ///
    /// `true` when DDL ran, `false` when `exists_ok` found the index present.
    pub fn create_index(&mut self, spec: IndexSpec) -> Result<bool> {
        spec.validate()?;
        let sql = self.session.dialect().create_index(&self.name, &spec)?;
        if spec.exists_ok && self.has_index(spec.lookup_name())? {
            debug!(table = %self.name, index = %spec.lookup_name(), "index exists");
            return Ok(false);
        }
        self.session.run_ddl(&self.name, &sql)?;
        Ok(true)
    }

    pub fn has_index(&mut self, name: &str) -> Result<bool> {
        self.session.has_index(&self.name, name)
    }
}

pub(crate) fn pairs<K, V, I>(data: I) -> Vec<(String, Value)>
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    data.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::core::db::ResultSet;
    use crate::dialect::EngineKind;
    use crate::session::Database;
    use crate::test_utils::RecordingDriver;
    use std::sync::Arc;

    fn sqlite() -> Session {
        Database::open(DatabaseConfig::default()).unwrap().session()
    }

    fn book(session: &mut Session) {
        let mut t = session.table("book").unwrap();
        t.add_column(ColumnSpec::new("id", "int").primary().auto_increment())
            .unwrap();
        t.add_column(ColumnSpec::new("name", "text")).unwrap();
        t.add_column(ColumnSpec::new("value", "int")).unwrap();
    }

    #[test]
    fn test_table_name_is_validated() {
        let mut session = sqlite();
        assert!(matches!(
            session.table("book; drop").map(|_| ()),
            Err(MapperError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_add_column_creates_then_alters() {
        let mut session = sqlite();
        book(&mut session);
        let mut t = session.table("book").unwrap();

        let columns = t.describe().unwrap();
        let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "value"]);
        assert_eq!(t.primary_key().unwrap().as_deref(), Some("id"));
        assert!(t.get_column("id").unwrap().unwrap().auto_increment);

        assert!(!t.add_column(ColumnSpec::new("name", "text").exists_ok()).unwrap());
        assert!(t.add_column(ColumnSpec::new("note", "varchar(20)").exists_ok()).unwrap());
        assert!(t.get_column("note").unwrap().is_some());
    }

    #[test]
    fn test_insert_find_and_get() {
        let mut session = sqlite();
        book(&mut session);
        let mut t = session.table("book").unwrap();

        let id = t.insert([("name", Value::from("ubuntu")), ("value", Value::from(1))]).unwrap();
        assert_eq!(id, Some(1));
        let row = t.get(1).unwrap().unwrap();
        assert_eq!(row.get("name"), Some(&Value::from("ubuntu")));
        assert!(t.get(2).unwrap().is_none());

        let empty: [(&str, Value); 0] = [];
        assert_eq!(t.insert(empty).unwrap(), Some(2));
        assert_eq!(t.count(()).unwrap(), 2);
        assert_eq!(t.count([("value", Value::Null)]).unwrap(), 1);
    }

    #[test]
    fn test_update_and_delete_counts() {
        let mut session = sqlite();
        book(&mut session);
        let mut t = session.table("book").unwrap();
        for name in ["a", "b", "b"] {
            t.insert([("name", name)]).unwrap();
        }

        assert_eq!(t.update([("name", "b")], [("value", 7)]).unwrap(), 2);
        assert_eq!(t.count(Filter::raw("value = ?", [7])).unwrap(), 2);
        assert!(matches!(
            t.update_one([("name", "b")], [("value", 8)]),
            Err(MapperError::Unsupported(_))
        ));
        assert_eq!(t.delete([("name", "a")]).unwrap(), 1);
        assert_eq!(t.count(()).unwrap(), 2);
    }

    #[test]
    fn test_primary_key_filter_needs_a_key() {
        let mut session = sqlite();
        session.execute("CREATE TABLE log (msg TEXT)", &[]).unwrap();
        let mut t = session.table("log").unwrap();
        assert!(matches!(t.get(1), Err(MapperError::NoPrimaryKey(_))));
        assert!(matches!(t.get(Filter::pk(1.5)), Err(MapperError::UnsupportedFilterType(_))));
    }

    #[test]
    fn test_indexes() {
        let mut session = sqlite();
        book(&mut session);
        let mut t = session.table("book").unwrap();

        let spec = IndexSpec::new("uniq_name", ["name"]).unique().exists_ok();
        assert!(t.create_index(spec.clone()).unwrap());
        assert!(t.has_index("uniq_name").unwrap());
        assert!(!t.create_index(spec).unwrap());

        t.insert([("name", "x")]).unwrap();
        assert!(matches!(
            t.insert([("name", "x")]),
            Err(MapperError::ConstraintViolation(_))
        ));
        assert!(matches!(
            t.create_index(IndexSpec::new("bad", Vec::<String>::new())),
            Err(MapperError::InvalidIndexSpec(_))
        ));
    }

    #[test]
    fn test_drop_invalidates_cache() {
        let mut session = sqlite();
        book(&mut session);
        session.table("book").unwrap().drop(false).unwrap();
        assert!(!session.has_table("book").unwrap());
        session.table("book").unwrap().drop(true).unwrap();
        assert!(session.describe("book").unwrap().is_empty());
    }

    #[test]
    fn test_mysql_update_one_and_empty_insert() {
        let driver = RecordingDriver::new();
        driver.respond(
            "DESCRIBE",
            ResultSet {
                columns: ["Field", "Type", "Null", "Key", "Default", "Extra"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                rows: vec![vec![
                    Value::from("id"),
                    Value::from("int(11)"),
                    Value::from("NO"),
                    Value::from("PRI"),
                    Value::Null,
                    Value::from("auto_increment"),
                ]],
                rowcount: 1,
                last_insert_id: None,
            },
        );
        let db = Database::with_driver(
            DatabaseConfig::server(EngineKind::MySql, "unittest"),
            Arc::new(driver.clone()),
        )
        .unwrap();
        let mut session = db.session();
        let mut t = session.table("book").unwrap();

        t.update_one(5, [("value", 1)]).unwrap();
        let empty: [(&str, i64); 0] = [];
        assert_eq!(t.insert(empty).unwrap(), Some(1));

        let sql: Vec<String> = driver.statements().into_iter().map(|(s, _)| s).collect();
        assert_eq!(
            sql,
            vec![
                "DESCRIBE `book`",
                "UPDATE `book` SET `value` = ? WHERE `book`.`id` = ? LIMIT 1",
                "INSERT INTO `book` () VALUES ()",
            ]
        );
    }

    #[test]
    fn test_left_join_resolves_target_key() {
        let mut session = sqlite();
        book(&mut session);
        session
            .execute("CREATE TABLE ref (id INTEGER PRIMARY KEY, book_id INTEGER)", &[])
            .unwrap();
        session
            .execute("INSERT INTO book (name, value) VALUES ('ubuntu', 1)", &[])
            .unwrap();
        session
            .execute("INSERT INTO ref (book_id) VALUES (1), (42)", &[])
            .unwrap();

        let mut refs = session.table("ref").unwrap();
        let rows = refs
            .find(Find::new().left_join("book AS b.id=book_id").order_by(["ref.id"]))
            .unwrap();
        assert_eq!(rows.len(), 2);
        let matched = rows[0].joined("b").unwrap().unwrap();
        assert_eq!(matched.get("name"), Some(&Value::from("ubuntu")));
        assert_eq!(rows[1].joined("b"), Some(None));
    }
}
