use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result as AnyResult};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Result};

use crate::model::{
    Character, ClassLevel, Gender, Item, ItemFields, Job, JobFields, JobStats, MainStats, Profile,
    JOB_STAT_COUNT,
};

/// Shared handle to the backing SQLite database.
///
/// Cloning is cheap; every clone talks to the same connection. Writes come
/// from the reconciling task only, never from spawned item fetches.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

static JOB_UPSERT: LazyLock<String> = LazyLock::new(|| {
    let cols = JobStats::COLUMNS.join(", ");
    let placeholders = (3..3 + JOB_STAT_COUNT)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = JobStats::COLUMNS
        .iter()
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO jobs (character_id, job, {cols}) VALUES (?1, ?2, {placeholders})
         ON CONFLICT(character_id, job) DO UPDATE SET {updates}, updated_at = datetime('now')
         RETURNING id"
    )
});

static JOB_SELECT: LazyLock<String> = LazyLock::new(|| {
    format!(
        "SELECT id, job, {} FROM jobs WHERE character_id = ?1 ORDER BY id",
        JobStats::COLUMNS.join(", ")
    )
});

impl Store {
    pub fn open(path: &Path) -> AnyResult<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {:?}", dir))?;
        }
        let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self::from_connection(conn);
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let store = Self::from_connection(conn);
        store.init_schema()?;
        Ok(store)
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn init_schema(&self) -> Result<()> {
        let stat_cols: String = JobStats::COLUMNS
            .iter()
            .map(|c| format!("            {c} INTEGER NOT NULL DEFAULT 0,\n"))
            .collect();
        self.conn().execute_batch(&format!(
            "
        CREATE TABLE IF NOT EXISTS characters (
            id                 INTEGER PRIMARY KEY,
            lodestone_id       TEXT UNIQUE NOT NULL,
            name               TEXT NOT NULL,
            free_company_name  TEXT NOT NULL,
            free_company_id    TEXT NOT NULL,
            server             TEXT NOT NULL,
            city_state         TEXT NOT NULL,
            grand_company_name TEXT NOT NULL,
            grand_company_rank TEXT NOT NULL,
            species            TEXT NOT NULL,
            gender             TEXT NOT NULL CHECK(gender IN ('Male','Female')),
            created_at         TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at         TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS character_levels (
            id           INTEGER PRIMARY KEY,
            character_id INTEGER NOT NULL REFERENCES characters(id),
            class        TEXT NOT NULL,
            level        INTEGER NOT NULL DEFAULT 0,
            UNIQUE(character_id, class)
        );

        CREATE TABLE IF NOT EXISTS jobs (
            id           INTEGER PRIMARY KEY,
            character_id INTEGER NOT NULL REFERENCES characters(id),
            job          TEXT NOT NULL,
{stat_cols}            updated_at   TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(character_id, job)
        );
        CREATE INDEX IF NOT EXISTS idx_jobs_character ON jobs(character_id);

        CREATE TABLE IF NOT EXISTS items (
            id             INTEGER PRIMARY KEY,
            lodestone_id   TEXT UNIQUE NOT NULL,
            name           TEXT NOT NULL,
            item_type      TEXT NOT NULL,
            item_level     INTEGER NOT NULL,
            block_strength INTEGER,
            block_rate     INTEGER,
            defense        INTEGER,
            magic_defense  INTEGER,
            damage         INTEGER,
            auto_attack    REAL,
            delay          REAL,
            created_at     TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at     TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS item_bonuses (
            id      INTEGER PRIMARY KEY,
            item_id INTEGER NOT NULL REFERENCES items(id),
            stat    TEXT NOT NULL,
            value   INTEGER NOT NULL,
            UNIQUE(item_id, stat)
        );

        CREATE TABLE IF NOT EXISTS job_items (
            job_id  INTEGER NOT NULL REFERENCES jobs(id),
            item_id INTEGER NOT NULL REFERENCES items(id),
            UNIQUE(job_id, item_id)
        );
        CREATE INDEX IF NOT EXISTS idx_job_items_item ON job_items(item_id);
        "
        ))
    }

    // ── Characters ──

    /// Create the character if absent, then overwrite its profile. Returns the row id.
    pub fn save_character(&self, lodestone_id: &str, p: &Profile) -> Result<i64> {
        self.conn().query_row(
            "INSERT INTO characters
             (lodestone_id, name, free_company_name, free_company_id, server, city_state,
              grand_company_name, grand_company_rank, species, gender)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(lodestone_id) DO UPDATE SET
                name = excluded.name,
                free_company_name = excluded.free_company_name,
                free_company_id = excluded.free_company_id,
                server = excluded.server,
                city_state = excluded.city_state,
                grand_company_name = excluded.grand_company_name,
                grand_company_rank = excluded.grand_company_rank,
                species = excluded.species,
                gender = excluded.gender,
                updated_at = datetime('now')
             RETURNING id",
            params![
                lodestone_id,
                p.name,
                p.free_company_name,
                p.free_company_id,
                p.server,
                p.city_state,
                p.grand_company_name,
                p.grand_company_rank,
                p.species,
                p.gender.as_str(),
            ],
            |r| r.get(0),
        )
    }

    pub fn save_levels(&self, character_id: i64, levels: &[ClassLevel]) -> Result<()> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO character_levels (character_id, class, level) VALUES (?1, ?2, ?3)
                 ON CONFLICT(character_id, class) DO UPDATE SET level = excluded.level",
            )?;
            for l in levels {
                stmt.execute(params![character_id, l.class, l.level])?;
            }
        }
        tx.commit()
    }

    pub fn load_character(&self, lodestone_id: &str) -> Result<Option<Character>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, name, free_company_name, free_company_id, server, city_state,
                        grand_company_name, grand_company_rank, species, gender
                 FROM characters WHERE lodestone_id = ?1",
                params![lodestone_id],
                |r| {
                    let gender: String = r.get(9)?;
                    let gender = Gender::from_db(&gender).ok_or_else(|| {
                        rusqlite::Error::FromSqlConversionFailure(
                            9,
                            rusqlite::types::Type::Text,
                            format!("bad gender {gender:?}").into(),
                        )
                    })?;
                    Ok((
                        r.get::<_, i64>(0)?,
                        Profile {
                            name: r.get(1)?,
                            free_company_name: r.get(2)?,
                            free_company_id: r.get(3)?,
                            server: r.get(4)?,
                            city_state: r.get(5)?,
                            grand_company_name: r.get(6)?,
                            grand_company_rank: r.get(7)?,
                            species: r.get(8)?,
                            gender,
                        },
                    ))
                },
            )
            .optional()?;
        let Some((id, profile)) = row else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT class, level FROM character_levels WHERE character_id = ?1 ORDER BY id",
        )?;
        let levels = stmt
            .query_map(params![id], |r| {
                Ok(ClassLevel {
                    class: r.get(0)?,
                    level: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Character {
            id,
            lodestone_id: lodestone_id.to_string(),
            profile,
            levels,
        }))
    }

    // ── Jobs ──

    /// Create the (character, job) row if absent, then overwrite its stats.
    pub fn save_job(&self, character_id: i64, fields: &JobFields) -> Result<i64> {
        let row = fields.stats.to_row();
        let mut values: Vec<&dyn ToSql> = vec![&character_id, &fields.job];
        values.extend(row.iter().map(|v| v as &dyn ToSql));
        self.conn()
            .query_row(JOB_UPSERT.as_str(), values.as_slice(), |r| r.get(0))
    }

    /// Empty the job's item set ahead of a fresh resolution.
    pub fn clear_job_items(&self, job_id: i64) -> Result<()> {
        self.conn()
            .execute("DELETE FROM job_items WHERE job_id = ?1", params![job_id])?;
        Ok(())
    }

    /// Link an item to a job; linking the same pair twice is a no-op.
    pub fn attach_job_item(&self, job_id: i64, item_id: i64) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO job_items (job_id, item_id) VALUES (?1, ?2)",
            params![job_id, item_id],
        )?;
        Ok(())
    }

    pub fn load_jobs(&self, character_id: i64) -> Result<Vec<Job>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&JOB_SELECT)?;
        let mut jobs = stmt
            .query_map(params![character_id], |r| {
                let mut row = [0i64; JOB_STAT_COUNT];
                for (i, v) in row.iter_mut().enumerate() {
                    *v = r.get(i + 2)?;
                }
                Ok(Job {
                    id: r.get(0)?,
                    character_id,
                    job: r.get(1)?,
                    stats: JobStats::from_row(row),
                    items: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        let mut items_stmt = conn.prepare(
            "SELECT i.lodestone_id FROM job_items ji
             JOIN items i ON i.id = ji.item_id
             WHERE ji.job_id = ?1
             ORDER BY i.lodestone_id",
        )?;
        for job in &mut jobs {
            job.items = items_stmt
                .query_map(params![job.id], |r| r.get(0))?
                .collect::<Result<Vec<String>>>()?;
        }
        Ok(jobs)
    }

    // ── Items ──

    /// Create the item if absent, then overwrite every column and its bonus set.
    pub fn save_item(&self, lodestone_id: &str, f: &ItemFields) -> Result<Item> {
        let (block_strength, block_rate, defense, magic_defense, damage, auto_attack, delay) =
            main_columns(&f.main);

        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        let id: i64 = tx.query_row(
            "INSERT INTO items
             (lodestone_id, name, item_type, item_level, block_strength, block_rate,
              defense, magic_defense, damage, auto_attack, delay)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(lodestone_id) DO UPDATE SET
                name = excluded.name,
                item_type = excluded.item_type,
                item_level = excluded.item_level,
                block_strength = excluded.block_strength,
                block_rate = excluded.block_rate,
                defense = excluded.defense,
                magic_defense = excluded.magic_defense,
                damage = excluded.damage,
                auto_attack = excluded.auto_attack,
                delay = excluded.delay,
                updated_at = datetime('now')
             RETURNING id",
            params![
                lodestone_id,
                f.name,
                f.item_type,
                f.item_level,
                block_strength,
                block_rate,
                defense,
                magic_defense,
                damage,
                auto_attack,
                delay,
            ],
            |r| r.get(0),
        )?;

        tx.execute("DELETE FROM item_bonuses WHERE item_id = ?1", params![id])?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO item_bonuses (item_id, stat, value) VALUES (?1, ?2, ?3)")?;
            for (stat, value) in &f.bonuses {
                stmt.execute(params![id, stat, value])?;
            }
        }
        tx.commit()?;

        Ok(Item {
            id,
            lodestone_id: lodestone_id.to_string(),
            fields: f.clone(),
        })
    }

    pub fn find_item(&self, lodestone_id: &str) -> Result<Option<Item>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, name, item_type, item_level, block_strength, block_rate,
                        defense, magic_defense, damage, auto_attack, delay
                 FROM items WHERE lodestone_id = ?1",
                params![lodestone_id],
                |r| {
                    let main = main_from_columns(
                        r.get(4)?,
                        r.get(5)?,
                        r.get(6)?,
                        r.get(7)?,
                        r.get(8)?,
                        r.get(9)?,
                        r.get(10)?,
                    );
                    Ok((
                        r.get::<_, i64>(0)?,
                        ItemFields {
                            name: r.get(1)?,
                            item_type: r.get(2)?,
                            item_level: r.get(3)?,
                            main,
                            bonuses: BTreeMap::new(),
                        },
                    ))
                },
            )
            .optional()?;
        let Some((id, mut fields)) = row else {
            return Ok(None);
        };

        let mut stmt = conn.prepare("SELECT stat, value FROM item_bonuses WHERE item_id = ?1")?;
        fields.bonuses = stmt
            .query_map(params![id], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<BTreeMap<String, i64>>>()?;

        Ok(Some(Item {
            id,
            lodestone_id: lodestone_id.to_string(),
            fields,
        }))
    }

    // ── Stats ──

    pub fn get_stats(&self) -> Result<Stats> {
        let conn = self.conn();
        let count = |table: &str| -> Result<usize> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        };
        Ok(Stats {
            characters: count("characters")?,
            jobs: count("jobs")?,
            items: count("items")?,
            job_items: count("job_items")?,
        })
    }
}

pub struct Stats {
    pub characters: usize,
    pub jobs: usize,
    pub items: usize,
    pub job_items: usize,
}

type MainColumns = (
    Option<i64>,
    Option<i64>,
    Option<i64>,
    Option<i64>,
    Option<i64>,
    Option<f64>,
    Option<f64>,
);

/// Columns for the variants that don't apply are written as NULL.
fn main_columns(main: &MainStats) -> MainColumns {
    match *main {
        MainStats::None => (None, None, None, None, None, None, None),
        MainStats::Block { strength, rate } => {
            (Some(strength), Some(rate), None, None, None, None, None)
        }
        MainStats::Defense {
            defense,
            magic_defense,
        } => (None, None, Some(defense), Some(magic_defense), None, None, None),
        MainStats::Weapon {
            damage,
            auto_attack,
            delay,
        } => (None, None, None, None, Some(damage), Some(auto_attack), Some(delay)),
    }
}

fn main_from_columns(
    block_strength: Option<i64>,
    block_rate: Option<i64>,
    defense: Option<i64>,
    magic_defense: Option<i64>,
    damage: Option<i64>,
    auto_attack: Option<f64>,
    delay: Option<f64>,
) -> MainStats {
    match (block_strength, block_rate, defense, magic_defense, damage, auto_attack, delay) {
        (Some(strength), Some(rate), ..) => MainStats::Block { strength, rate },
        (_, _, Some(defense), Some(magic_defense), ..) => MainStats::Defense {
            defense,
            magic_defense,
        },
        (.., Some(damage), Some(auto_attack), Some(delay)) => MainStats::Weapon {
            damage,
            auto_attack,
            delay,
        },
        _ => MainStats::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str) -> Profile {
        Profile {
            name: name.into(),
            free_company_name: "Zanarkand".into(),
            free_company_id: "9229283011365743624".into(),
            server: "Excalibur".into(),
            city_state: "Gridania".into(),
            grand_company_name: "Order of the Twin Adder".into(),
            grand_company_rank: "Second Serpent Lieutenant".into(),
            species: "Miqo'te".into(),
            gender: Gender::Female,
        }
    }

    fn shield(bonuses: &[(&str, i64)]) -> ItemFields {
        ItemFields {
            name: "Ironclad Shield".into(),
            item_type: "Shield".into(),
            item_level: 70,
            main: MainStats::Block { strength: 94, rate: 87 },
            bonuses: bonuses.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn character_upsert_keeps_one_row() {
        let store = Store::open_in_memory().unwrap();
        let a = store.save_character("8774791", &profile("Mina Loriel")).unwrap();
        let b = store.save_character("8774791", &profile("Mina Renamed")).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.get_stats().unwrap().characters, 1);
        let c = store.load_character("8774791").unwrap().unwrap();
        assert_eq!(c.profile.name, "Mina Renamed");
    }

    #[test]
    fn levels_overwrite_to_zero() {
        let store = Store::open_in_memory().unwrap();
        let id = store.save_character("1", &profile("A")).unwrap();
        let lvl = |level| vec![ClassLevel { class: "fisher".into(), level }];
        store.save_levels(id, &lvl(50)).unwrap();
        store.save_levels(id, &lvl(0)).unwrap();
        let c = store.load_character("1").unwrap().unwrap();
        assert_eq!(c.level("fisher"), Some(0));
    }

    #[test]
    fn job_identity_is_character_and_kind() {
        let store = Store::open_in_memory().unwrap();
        let c1 = store.save_character("1", &profile("A")).unwrap();
        let c2 = store.save_character("2", &profile("B")).unwrap();
        let whm = |hp| JobFields {
            job: "White Mage".into(),
            stats: JobStats { hp, ..Default::default() },
        };
        let j1 = store.save_job(c1, &whm(100)).unwrap();
        let j1_again = store.save_job(c1, &whm(0)).unwrap();
        let j2 = store.save_job(c2, &whm(100)).unwrap();
        assert_eq!(j1, j1_again);
        assert_ne!(j1, j2);

        let jobs = store.load_jobs(c1).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].stats.hp, 0);
    }

    #[test]
    fn item_resave_clears_stale_columns() {
        let store = Store::open_in_memory().unwrap();
        store.save_item("abc123", &shield(&[("vitality", 5), ("piety", 3)])).unwrap();

        let mut fields = shield(&[("vitality", 6)]);
        fields.item_type = "Body".into();
        fields.main = MainStats::Defense { defense: 62, magic_defense: 108 };
        store.save_item("abc123", &fields).unwrap();

        let item = store.find_item("abc123").unwrap().unwrap();
        assert_eq!(item.fields.main, MainStats::Defense { defense: 62, magic_defense: 108 });
        assert_eq!(item.bonus("vitality"), Some(6));
        assert_eq!(item.bonus("piety"), None);

        let block: Option<i64> = store
            .conn()
            .query_row("SELECT block_strength FROM items WHERE lodestone_id = 'abc123'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(block, None);
        assert_eq!(store.get_stats().unwrap().items, 1);
    }

    #[test]
    fn job_items_are_replaced() {
        let store = Store::open_in_memory().unwrap();
        let c = store.save_character("1", &profile("A")).unwrap();
        let job = store
            .save_job(c, &JobFields { job: "Paladin".into(), stats: JobStats::default() })
            .unwrap();
        let a = store.save_item("aaa", &shield(&[])).unwrap();
        let b = store.save_item("bbb", &shield(&[])).unwrap();

        for id in [a.id, b.id, a.id] {
            store.attach_job_item(job, id).unwrap();
        }
        assert_eq!(store.load_jobs(c).unwrap()[0].items, vec!["aaa", "bbb"]);

        store.clear_job_items(job).unwrap();
        store.attach_job_item(job, b.id).unwrap();
        assert_eq!(store.load_jobs(c).unwrap()[0].items, vec!["bbb"]);
    }

    #[test]
    fn missing_records() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.find_item("nope").unwrap().is_none());
        assert!(store.load_character("404").unwrap().is_none());
    }
}
