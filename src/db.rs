//! Local SQLite database layer for Kiosko POS.
//!
//! Uses rusqlite with WAL mode. Provides schema migrations, settings helpers,
//! column decoding for money and timestamps, and the shared connection state.

use chrono::{Local, NaiveDateTime, Timelike};
use rusqlite::types::{Type, ValueRef};
use rusqlite::{params, Connection, ErrorCode, Row};
use rust_decimal::Decimal;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::error::{PosError, Result};

/// Shared database connection.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

impl DbState {
    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| PosError::Lock(e.to_string()))
    }
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Text layout of every timestamp column (local time).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Open the database at `db_path`.
///
/// Creates the parent directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. A file SQLite reports as corrupt or not a
/// database is renamed to `<name>.corrupt-<timestamp>` and a fresh database is
/// created in its place. Any other open failure is returned as is.
pub fn init(db_path: &Path) -> Result<DbState> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(db_path) {
        Ok(c) => c,
        Err(e) if is_corruption(&e) => {
            let moved_to = quarantine(db_path)?;
            warn!(
                error = %e,
                quarantined = %moved_to.display(),
                "Database file is unreadable, starting a new one"
            );
            open_and_configure(db_path)?
        }
        Err(e) => return Err(e),
    };

    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path: db_path.to_path_buf(),
    })
}

fn is_corruption(err: &PosError) -> bool {
    matches!(
        err,
        PosError::Database(rusqlite::Error::SqliteFailure(e, _))
            if matches!(e.code, ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase)
    )
}

/// Move an unreadable database and its WAL/SHM files aside.
fn quarantine(db_path: &Path) -> Result<PathBuf> {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let moved_to = sidecar(db_path, &format!(".corrupt-{stamp}"));
    fs::rename(db_path, &moved_to)?;
    for suffix in ["-wal", "-shm"] {
        let side = sidecar(db_path, suffix);
        if side.exists() {
            fs::rename(&side, sidecar(&moved_to, suffix))?;
        }
    }
    Ok(moved_to)
}

fn sidecar(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "PRAGMA busy_timeout = 5000;
         PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA synchronous = NORMAL;",
    )?;

    // A corrupt file opens fine and only fails on first read.
    conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    })?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Migration v1: catalog, sales and audit tables.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- local_settings (category/key/value store)
        CREATE TABLE IF NOT EXISTS local_settings (
            id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(setting_category, setting_key)
        );

        CREATE TABLE IF NOT EXISTS categorias (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nombre TEXT NOT NULL UNIQUE COLLATE NOCASE,
            descripcion TEXT NOT NULL DEFAULT ''
        );

        -- money columns hold exact decimal text
        CREATE TABLE IF NOT EXISTS productos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            codigo_barras TEXT NOT NULL UNIQUE,
            nombre TEXT NOT NULL,
            precio TEXT NOT NULL DEFAULT '0',
            stock INTEGER NOT NULL DEFAULT 0,
            stock_minimo INTEGER NOT NULL DEFAULT 0,
            proveedor TEXT NOT NULL DEFAULT '',
            categoria_id INTEGER REFERENCES categorias(id),
            activo INTEGER NOT NULL DEFAULT 1,
            fecha_creacion TEXT NOT NULL DEFAULT (datetime('now', 'localtime')),
            fecha_modificacion TEXT
        );

        CREATE TABLE IF NOT EXISTS puntos_venta (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nombre TEXT NOT NULL,
            direccion TEXT NOT NULL DEFAULT '',
            telefono TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS ventas (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fecha TEXT NOT NULL,
            total TEXT NOT NULL,
            descuento TEXT NOT NULL DEFAULT '0',
            forma_pago TEXT NOT NULL,
            monto_recibido TEXT NOT NULL,
            vuelto TEXT NOT NULL DEFAULT '0',
            punto_venta_id INTEGER REFERENCES puntos_venta(id)
        );

        CREATE TABLE IF NOT EXISTS detalle_venta (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            venta_id INTEGER NOT NULL REFERENCES ventas(id) ON DELETE CASCADE,
            producto_id INTEGER NOT NULL REFERENCES productos(id),
            cantidad INTEGER NOT NULL CHECK (cantidad > 0),
            precio_unitario TEXT NOT NULL,
            subtotal TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS movimientos_stock (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            producto_id INTEGER NOT NULL REFERENCES productos(id),
            tipo TEXT NOT NULL CHECK (tipo IN ('VENTA', 'AJUSTE')),
            cantidad INTEGER NOT NULL,
            stock_anterior INTEGER NOT NULL,
            stock_nuevo INTEGER NOT NULL,
            venta_id INTEGER REFERENCES ventas(id),
            fecha TEXT NOT NULL
        );

        -- Record migration
        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        PosError::from(e)
    })?;

    info!("Applied migration v1 (catalog and sales tables)");
    Ok(())
}

/// Migration v2: users and lookup indexes.
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS usuarios (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            usuario TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            rol TEXT NOT NULL CHECK (rol IN ('admin', 'cajero', 'deposito')),
            activo INTEGER NOT NULL DEFAULT 1,
            creado_en TEXT DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_ventas_fecha ON ventas(fecha);
        CREATE INDEX IF NOT EXISTS idx_detalle_venta_venta ON detalle_venta(venta_id);
        CREATE INDEX IF NOT EXISTS idx_movimientos_producto ON movimientos_stock(producto_id);
        CREATE INDEX IF NOT EXISTS idx_productos_nombre ON productos(nombre);

        -- Record migration
        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        PosError::from(e)
    })?;

    info!("Applied migration v2 (usuarios table, indexes)");
    Ok(())
}

// ---------------------------------------------------------------------------
// Column helpers
// ---------------------------------------------------------------------------

/// Current local time as stored in timestamp columns.
pub fn now_timestamp() -> NaiveDateTime {
    let now = Local::now().naive_local();
    // Sub-second precision does not survive the TEXT column.
    now.with_nanosecond(0).unwrap_or(now)
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Read a money column. Accepts decimal text, integers and reals.
pub fn money_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    match row.get_ref(idx)? {
        ValueRef::Null => Ok(Decimal::ZERO),
        ValueRef::Integer(i) => Ok(Decimal::from(i)),
        ValueRef::Real(f) => Decimal::try_from(f)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Real, Box::new(e))),
        ValueRef::Text(t) => {
            let s = std::str::from_utf8(t).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            })?;
            Decimal::from_str(s.trim())
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
        }
        ValueRef::Blob(_) => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "money".to_string(),
            Type::Blob,
        )),
    }
}

/// Read a `YYYY-MM-DD HH:MM:SS` column.
pub fn timestamp_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Get a single setting value.
pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .ok()
}

/// Insert or update a setting.
pub fn set_setting(conn: &Connection, category: &str, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )?;
    Ok(())
}

/// All settings of one category, ordered by key.
pub fn get_settings_in(conn: &Connection, category: &str) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT setting_key, setting_value FROM local_settings
         WHERE setting_category = ?1 ORDER BY setting_key",
    )?;
    let rows = stmt
        .query_map(params![category], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Delete one setting. Returns whether it existed.
pub fn delete_setting(conn: &Connection, category: &str, key: &str) -> Result<bool> {
    let n = conn.execute(
        "DELETE FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
    )?;
    Ok(n > 0)
}

// ---------------------------------------------------------------------------
// Demo data
// ---------------------------------------------------------------------------

const DEMO_CATEGORIES: &[(&str, &str)] = &[
    ("Bebidas", "Gaseosas, aguas y jugos"),
    ("Lácteos", "Leche, yogur y quesos"),
    ("Enlatados", "Conservas"),
    ("Limpieza", "Artículos de limpieza"),
    ("Carnes", "Fiambres y carnes"),
    ("Frutas", "Frutas frescas"),
    ("Verduras", "Verduras frescas"),
    ("Almacén", "Productos secos"),
];

/// (barcode, name, price, stock, category)
const DEMO_PRODUCTS: &[(&str, &str, &str, i64, &str)] = &[
    ("7790895000997", "Coca Cola 500ml", "1.50", 48, "Bebidas"),
    ("7790315000123", "Agua Mineral 1.5L", "1.10", 60, "Bebidas"),
    ("7791234500011", "Jugo de Naranja 1L", "2.30", 24, "Bebidas"),
    ("7790070012345", "Leche Entera 1L", "1.25", 30, "Lácteos"),
    ("7790070099887", "Yogur Frutilla 190g", "0.95", 18, "Lácteos"),
    ("7790070055221", "Queso Cremoso 500g", "6.80", 8, "Lácteos"),
    ("7790580112233", "Atún en Aceite 170g", "2.75", 20, "Enlatados"),
    ("7790580445566", "Arvejas 300g", "0.85", 35, "Enlatados"),
    ("7791290011223", "Lavandina 1L", "1.40", 15, "Limpieza"),
    ("7791290099881", "Detergente 750ml", "2.10", 12, "Limpieza"),
    ("2000000000017", "Jamón Cocido 100g", "3.20", 10, "Carnes"),
    ("2000000000024", "Banana x kg", "1.90", 25, "Frutas"),
    ("2000000000031", "Tomate x kg", "2.40", 20, "Verduras"),
    ("7790040123456", "Fideos Spaghetti 500g", "1.05", 40, "Almacén"),
    ("7790040987654", "Arroz Largo Fino 1kg", "1.60", 3, "Almacén"),
];

const DEMO_POINTS: &[(&str, &str, &str)] = &[
    ("Caja Cliente", "Mostrador principal", "555-0100"),
    ("PC Depósito", "Depósito", "555-0101"),
];

/// Load a small demo catalog into an empty database.
///
/// Returns the number of products inserted; zero when products already exist.
pub fn seed_demo_data(conn: &Connection) -> Result<usize> {
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM productos", [], |row| row.get(0))?;
    if existing > 0 {
        return Ok(0);
    }

    conn.execute_batch("BEGIN IMMEDIATE")?;

    let result = (|| -> Result<usize> {
        for (name, description) in DEMO_CATEGORIES {
            conn.execute(
                "INSERT OR IGNORE INTO categorias (nombre, descripcion) VALUES (?1, ?2)",
                params![name, description],
            )?;
        }
        for (barcode, name, price, stock, category) in DEMO_PRODUCTS {
            conn.execute(
                "INSERT INTO productos (codigo_barras, nombre, precio, stock, categoria_id, activo)
                 VALUES (?1, ?2, ?3, ?4, (SELECT id FROM categorias WHERE nombre = ?5), 1)",
                params![barcode, name, price, stock, category],
            )?;
        }
        let points: i64 =
            conn.query_row("SELECT COUNT(*) FROM puntos_venta", [], |row| row.get(0))?;
        if points == 0 {
            for (name, address, phone) in DEMO_POINTS {
                conn.execute(
                    "INSERT INTO puntos_venta (nombre, direccion, telefono) VALUES (?1, ?2, ?3)",
                    params![name, address, phone],
                )?;
            }
        }
        Ok(DEMO_PRODUCTS.len())
    })();

    match result {
        Ok(n) => {
            conn.execute_batch("COMMIT")?;
            info!(products = n, "Seeded demo catalog");
            Ok(n)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

/// Run all migrations on the given connection (test helper, not public API).
#[cfg(test)]
pub fn run_migrations_for_test(conn: &Connection) {
    run_migrations(conn).expect("run_migrations should succeed in test");
}

/// In-memory database with pragmas and migrations applied.
#[cfg(test)]
pub fn test_state() -> DbState {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
    .expect("pragma setup");
    run_migrations_for_test(&conn);
    DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .expect("pragma setup");
        conn
    }

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare table list");
        stmt.query_map([], |row| row.get(0))
            .expect("query tables")
            .filter_map(|r| r.ok())
            .collect()
    }

    // ------------------------------------------------------------------
    // Migration tests
    // ------------------------------------------------------------------

    #[test]
    fn test_migrations_create_all_tables() {
        let conn = test_db();
        run_migrations(&conn).expect("run_migrations should succeed");

        let tables = table_names(&conn);
        for expected in [
            "local_settings",
            "categorias",
            "productos",
            "puntos_venta",
            "ventas",
            "detalle_venta",
            "movimientos_stock",
            "usuarios",
            "schema_version",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = test_db();
        run_migrations(&conn).expect("first run");
        run_migrations(&conn).expect("second run should succeed");

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .expect("read schema version");
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_wal_mode_on_file_db() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("kiosko.db");

        let state = init(&db_path).expect("init file db");
        let conn = state.lock().expect("lock");
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .expect("read journal_mode");
        assert_eq!(mode.to_lowercase(), "wal", "journal_mode should be WAL");
    }

    #[test]
    fn test_corrupt_file_is_set_aside() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("kiosko.db");
        let garbage = b"this is definitely not a sqlite database file......";
        fs::write(&db_path, garbage).expect("write garbage");

        let state = init(&db_path).expect("init should recover");
        let conn = state.lock().expect("lock");
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM productos", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 0);

        let kept: Vec<PathBuf> = fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                let name = p.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                name.starts_with("kiosko.db.corrupt-")
                    && !name.ends_with("-wal")
                    && !name.ends_with("-shm")
            })
            .collect();
        assert_eq!(kept.len(), 1, "old file should be renamed, not deleted");
        assert_eq!(fs::read(&kept[0]).expect("read kept file"), garbage);
    }

    #[test]
    fn test_open_error_other_than_corruption_is_returned() {
        let dir = tempfile::tempdir().expect("tempdir");
        // A directory at the database path cannot be opened as a file.
        let db_path = dir.path().join("kiosko.db");
        fs::create_dir(&db_path).expect("mkdir");

        assert!(init(&db_path).is_err());
        assert!(db_path.is_dir(), "path must be left untouched");
    }

    #[test]
    fn test_detail_quantity_must_be_positive() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");
        conn.execute(
            "INSERT INTO productos (codigo_barras, nombre, precio) VALUES ('1', 'x', '1')",
            [],
        )
        .expect("product");
        conn.execute(
            "INSERT INTO ventas (fecha, total, forma_pago, monto_recibido)
             VALUES ('2024-01-01 10:00:00', '0', 'EFECTIVO', '0')",
            [],
        )
        .expect("sale");
        let err = conn.execute(
            "INSERT INTO detalle_venta (venta_id, producto_id, cantidad, precio_unitario, subtotal)
             VALUES (1, 1, 0, '1', '0')",
            [],
        );
        assert!(err.is_err(), "zero quantity should violate CHECK");
    }

    #[test]
    fn test_settings_crud() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        set_setting(&conn, "pos", "store_name", "Kiosko Sur").expect("set");
        assert_eq!(
            get_setting(&conn, "pos", "store_name"),
            Some("Kiosko Sur".to_string())
        );

        set_setting(&conn, "pos", "store_name", "Kiosko Norte").expect("update");
        assert_eq!(
            get_setting(&conn, "pos", "store_name"),
            Some("Kiosko Norte".to_string())
        );
        assert_eq!(
            get_settings_in(&conn, "pos").expect("list"),
            vec![("store_name".to_string(), "Kiosko Norte".to_string())]
        );

        assert!(delete_setting(&conn, "pos", "store_name").expect("delete"));
        assert!(get_setting(&conn, "pos", "store_name").is_none());
    }

    #[test]
    fn test_money_and_timestamp_columns() {
        let conn = test_db();
        let (text, int, real, ts) = conn
            .query_row(
                "SELECT '12.50', 7, 0.25, '2024-03-09 18:30:05'",
                [],
                |row| {
                    Ok((
                        money_col(row, 0)?,
                        money_col(row, 1)?,
                        money_col(row, 2)?,
                        timestamp_col(row, 3)?,
                    ))
                },
            )
            .expect("decode");
        assert_eq!(text, Decimal::new(1250, 2));
        assert_eq!(int, Decimal::from(7));
        assert_eq!(real, Decimal::new(25, 2));
        assert_eq!(format_timestamp(&ts), "2024-03-09 18:30:05");

        let bad = conn.query_row("SELECT 'abc'", [], |row| money_col(row, 0));
        assert!(bad.is_err());
    }

    #[test]
    fn test_seed_demo_data_once() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");
        let n = seed_demo_data(&conn).expect("seed");
        assert_eq!(n, DEMO_PRODUCTS.len());
        assert_eq!(seed_demo_data(&conn).expect("second seed"), 0);

        let uncategorized: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM productos WHERE categoria_id IS NULL",
                [],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(uncategorized, 0);
    }
}
