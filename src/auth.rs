//! Username/password login with bcrypt, role-based section access and
//! failed-attempt lockout.
//!
//! Users live in the `usuarios` table. Lockout state is tracked per username
//! in `local_settings` (category "auth") so it survives restarts. The active
//! session is kept in memory.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::db::{self, DbState};
use crate::error::{PosError, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const MAX_FAILED_ATTEMPTS: u32 = 5;
const LOCKOUT_MINUTES: i64 = 15;
const LOCKOUT_CATEGORY: &str = "auth";

/// Seeded when the user table is empty.
const DEFAULT_USERS: &[(&str, &str, Role)] = &[
    ("admin", "admin", Role::Admin),
    ("cajero1", "cajero", Role::Cashier),
    ("cajero2", "cajero", Role::Cashier),
    ("deposito", "deposito", Role::Warehouse),
];

// ---------------------------------------------------------------------------
// Roles and sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Cashier,
    Warehouse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Section {
    Dashboard,
    NewSale,
    Products,
    Categories,
    SalesHistory,
    PointsOfSale,
    Simulator,
}

impl Section {
    pub const ALL: [Section; 7] = [
        Self::Dashboard,
        Self::NewSale,
        Self::Products,
        Self::Categories,
        Self::SalesHistory,
        Self::PointsOfSale,
        Self::Simulator,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Dashboard => "Dashboard",
            Self::NewSale => "New sale",
            Self::Products => "Products",
            Self::Categories => "Categories",
            Self::SalesHistory => "Sales history",
            Self::PointsOfSale => "Points of sale",
            Self::Simulator => "Simulator",
        }
    }
}

impl Role {
    pub fn as_db(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Cashier => "cajero",
            Self::Warehouse => "deposito",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Admin),
            "cajero" => Some(Self::Cashier),
            "deposito" => Some(Self::Warehouse),
            _ => None,
        }
    }

    pub fn sections(self) -> &'static [Section] {
        match self {
            Self::Admin => &Section::ALL,
            Self::Cashier => &[Section::NewSale, Section::Products, Section::Categories],
            Self::Warehouse => &[Section::Products],
        }
    }

    pub fn can_access(self, section: Section) -> bool {
        self.sections().contains(&section)
    }

    /// Section shown right after login.
    pub fn initial_section(self) -> Section {
        match self {
            Self::Admin => Section::Dashboard,
            Self::Cashier => Section::NewSale,
            Self::Warehouse => Section::Products,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "cajero" | "cashier" => Ok(Self::Cashier),
            "deposito" | "warehouse" => Ok(Self::Warehouse),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub active: bool,
}

pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    Ok(bcrypt::hash(password, cost)?)
}

pub fn create_user(
    conn: &Connection,
    username: &str,
    password: &str,
    role: Role,
    cost: u32,
) -> Result<i64> {
    let username = username.trim();
    if username.is_empty() {
        return Err(PosError::validation("username is required"));
    }
    if password.is_empty() {
        return Err(PosError::validation("password is required"));
    }
    let hash = hash_password(password, cost)?;
    conn.execute(
        "INSERT INTO usuarios (usuario, password_hash, rol) VALUES (?1, ?2, ?3)",
        params![username, hash, role.as_db()],
    )?;
    info!(username, role = %role, "user created");
    Ok(conn.last_insert_rowid())
}

/// Seed the default users when none exist. Returns how many were created.
pub fn ensure_default_users(conn: &Connection, cost: u32) -> Result<usize> {
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM usuarios", [], |r| r.get(0))?;
    if existing > 0 {
        return Ok(0);
    }
    for (username, password, role) in DEFAULT_USERS {
        create_user(conn, username, password, *role, cost)?;
    }
    Ok(DEFAULT_USERS.len())
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt =
        conn.prepare("SELECT id, usuario, rol, activo FROM usuarios ORDER BY usuario")?;
    let rows = stmt
        .query_map([], |row| {
            let rol: String = row.get(2)?;
            Ok((row.get(0)?, row.get(1)?, rol, row.get(3)?))
        })?
        .collect::<rusqlite::Result<Vec<(i64, String, String, bool)>>>()?;
    Ok(rows
        .into_iter()
        .filter_map(|(id, username, rol, active)| {
            Role::from_db(&rol).map(|role| User {
                id,
                username,
                role,
                active,
            })
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Lockout
// ---------------------------------------------------------------------------

struct LockoutEntry {
    attempts: u32,
    last_attempt: DateTime<Utc>,
}

fn attempts_key(username: &str) -> String {
    format!("{username}:attempts")
}

fn last_attempt_key(username: &str) -> String {
    format!("{username}:last_attempt")
}

fn load_lockout(conn: &Connection, username: &str) -> LockoutEntry {
    let attempts = db::get_setting(conn, LOCKOUT_CATEGORY, &attempts_key(username))
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);
    let last_attempt = db::get_setting(conn, LOCKOUT_CATEGORY, &last_attempt_key(username))
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    LockoutEntry {
        attempts,
        last_attempt,
    }
}

fn persist_lockout(conn: &Connection, username: &str, lockout: &LockoutEntry) -> Result<()> {
    db::set_setting(
        conn,
        LOCKOUT_CATEGORY,
        &attempts_key(username),
        &lockout.attempts.to_string(),
    )?;
    db::set_setting(
        conn,
        LOCKOUT_CATEGORY,
        &last_attempt_key(username),
        &lockout.last_attempt.to_rfc3339(),
    )
}

fn clear_lockout(conn: &Connection, username: &str) -> Result<()> {
    db::delete_setting(conn, LOCKOUT_CATEGORY, &attempts_key(username))?;
    db::delete_setting(conn, LOCKOUT_CATEGORY, &last_attempt_key(username))?;
    Ok(())
}

/// Drop every entry whose last failure is older than the lockout window.
/// Unknown usernames are tracked too, so this keeps the table bounded.
fn prune_expired_lockouts(conn: &Connection) -> Result<usize> {
    let cutoff = Utc::now() - Duration::minutes(LOCKOUT_MINUTES);
    let mut pruned = 0;
    for (key, value) in db::get_settings_in(conn, LOCKOUT_CATEGORY)? {
        let Some(username) = key.strip_suffix(":last_attempt") else {
            continue;
        };
        let expired = DateTime::parse_from_rfc3339(&value)
            .map(|dt| dt.with_timezone(&Utc) <= cutoff)
            .unwrap_or(true);
        if expired {
            clear_lockout(conn, username)?;
            pruned += 1;
        }
    }
    if pruned > 0 {
        debug!(pruned, "Expired lockout entries removed");
    }
    Ok(pruned)
}

fn check_lockout(lockout: &LockoutEntry) -> Result<()> {
    if lockout.attempts >= MAX_FAILED_ATTEMPTS {
        let elapsed = Utc::now() - lockout.last_attempt;
        if elapsed < Duration::minutes(LOCKOUT_MINUTES) {
            return Err(PosError::LockedOut {
                minutes: LOCKOUT_MINUTES - elapsed.num_minutes(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub login_time: DateTime<Utc>,
}

impl Session {
    pub fn require(&self, section: Section) -> Result<()> {
        if self.role.can_access(section) {
            Ok(())
        } else {
            Err(PosError::Unauthorized(format!(
                "{} cannot access {}",
                self.role,
                section.label()
            )))
        }
    }
}

#[derive(Default)]
pub struct AuthState {
    current: Mutex<Option<Session>>,
}

impl AuthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Result<Option<Session>> {
        self.current
            .lock()
            .map(|s| s.clone())
            .map_err(|e| PosError::Lock(e.to_string()))
    }

    /// Current session, if it may open `section`.
    pub fn require(&self, section: Section) -> Result<Session> {
        let session = self
            .current()?
            .ok_or_else(|| PosError::Unauthorized("not logged in".into()))?;
        session.require(section)?;
        Ok(session)
    }

    pub fn logout(&self) -> Result<()> {
        let mut current = self
            .current
            .lock()
            .map_err(|e| PosError::Lock(e.to_string()))?;
        if let Some(session) = current.take() {
            info!(session_id = %session.session_id, username = %session.username, "logged out");
        }
        Ok(())
    }
}

/// Verify credentials and open a session.
pub fn login(
    db: &DbState,
    auth: &AuthState,
    username: &str,
    password: Zeroizing<String>,
) -> Result<Session> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(PosError::LoginFailed);
    }

    let conn = db.lock()?;
    prune_expired_lockouts(&conn)?;
    let mut lockout = load_lockout(&conn, username);
    check_lockout(&lockout)?;

    let row: Option<(i64, String, String)> = conn
        .query_row(
            "SELECT id, password_hash, rol FROM usuarios WHERE usuario = ?1 AND activo = 1",
            params![username],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;

    let verified = row.and_then(|(id, hash, rol)| {
        let hash = Zeroizing::new(hash);
        let ok = bcrypt::verify(password.as_str(), &hash).unwrap_or(false);
        ok.then_some(id).zip(Role::from_db(&rol))
    });

    let Some((user_id, role)) = verified else {
        lockout.attempts += 1;
        lockout.last_attempt = Utc::now();
        persist_lockout(&conn, username, &lockout)?;
        warn!(username, attempts = lockout.attempts, "failed login attempt");
        return Err(PosError::LoginFailed);
    };

    if lockout.attempts > 0 {
        clear_lockout(&conn, username)?;
    }

    let session = Session {
        session_id: Uuid::new_v4().to_string(),
        user_id,
        username: username.to_string(),
        role,
        login_time: Utc::now(),
    };
    *auth
        .current
        .lock()
        .map_err(|e| PosError::Lock(e.to_string()))? = Some(session.clone());
    info!(username, role = %role, session_id = %session.session_id, "login successful");
    Ok(session)
}
