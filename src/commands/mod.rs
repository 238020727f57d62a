//! Command handlers behind the `kiosko` CLI.
//!
//! Every handler takes the shared [`Context`] (database, cache, effective
//! config and the logged-in session) and writes its result to `out`, either
//! as aligned text or, with `--json`, as one JSON document.

pub mod catalog;
pub mod register;
pub mod reports;
pub mod sales;
pub mod settings;
pub mod simulate;

use serde::Serialize;
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::auth::{self, AuthState, Section, Session};
use crate::cache::AppCache;
use crate::cli::{Cli, Command};
use crate::config::PosConfig;
use crate::db::{self, DbState};
use crate::error::{PosError, Result};

pub struct Context {
    pub config: PosConfig,
    pub db: Arc<DbState>,
    pub cache: AppCache,
    pub auth: AuthState,
    pub session: Session,
    pub json: bool,
}

impl Context {
    /// Current session, if allowed into `section`.
    pub fn require(&self, section: Section) -> Result<&Session> {
        self.session.require(section)?;
        Ok(&self.session)
    }

    /// Re-read the cache after a write; a failure only leaves it stale.
    pub fn refresh_cache(&mut self) {
        if let Err(e) = self.cache.refresh(&self.db) {
            warn!(error = %e, "cache left stale after write");
        }
    }

    /// JSON document with `--json`, text lines otherwise.
    pub fn emit<T: Serialize>(
        &self,
        out: &mut dyn Write,
        value: &T,
        lines: Vec<String>,
    ) -> Result<()> {
        if self.json {
            write_json(out, value)
        } else {
            write_lines(out, &lines)
        }
    }
}

pub fn write_json<T: Serialize>(out: &mut dyn Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).map_err(std::io::Error::from)?;
    writeln!(out)?;
    Ok(())
}

pub fn write_lines(out: &mut dyn Write, lines: &[String]) -> Result<()> {
    for line in lines {
        writeln!(out, "{line}")?;
    }
    Ok(())
}

/// Open the database, apply stored settings, log in and load the cache.
pub fn open(cli: &Cli, mut config: PosConfig) -> Result<Context> {
    let db = Arc::new(db::init(&config.db_path)?);
    {
        let conn = db.lock()?;
        config.apply_settings(&conn)?;
        let seeded = auth::ensure_default_users(&conn, bcrypt::DEFAULT_COST)?;
        if seeded > 0 {
            info!(users = seeded, "seeded default users");
        }
    }

    let (Some(user), Some(password)) = (cli.user.as_deref(), cli.password.as_deref()) else {
        return Err(PosError::Unauthorized(
            "login required: pass --user and --password (or KIOSKO_USER / KIOSKO_PASSWORD)".into(),
        ));
    };
    let auth = AuthState::new();
    let session = auth::login(&db, &auth, user, Zeroizing::new(password.to_string()))?;
    let cache = AppCache::load(&db)?;

    Ok(Context {
        config,
        db,
        cache,
        auth,
        session,
        json: cli.json,
    })
}

pub fn dispatch(
    ctx: &mut Context,
    command: Command,
    input: &mut dyn BufRead,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        Command::Dashboard => reports::dashboard(ctx, out),
        Command::Products { action } => catalog::products(ctx, action, out),
        Command::Categories { action } => catalog::categories(ctx, action, out),
        Command::Points { action } => catalog::points(ctx, action, out),
        Command::Sales { action } => sales::history(ctx, action, out),
        Command::Sell(args) => sales::sell(ctx, args, out),
        Command::Register => register::run(ctx, input, out),
        Command::Simulate(args) => simulate::run(ctx, args, out),
        Command::Report { action } => reports::export(ctx, action, out),
        Command::Config { action } => settings::config(ctx, action, out),
        Command::Users { action } => settings::users(ctx, action, out),
        Command::Seed => settings::seed(ctx, out),
        Command::Whoami => settings::whoami(ctx, out),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::PosConfig;

    /// Context over an in-memory database, logged in as `username`.
    pub fn context(username: &str, password: &str) -> (Context, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Arc::new(db::test_state());
        {
            let conn = db.lock().expect("lock");
            auth::ensure_default_users(&conn, 4).expect("users");
            db::seed_demo_data(&conn).expect("demo data");
        }
        let auth = AuthState::new();
        let session = auth::login(&db, &auth, username, Zeroizing::new(password.to_string()))
            .expect("login");
        let cache = AppCache::load(&db).expect("cache");
        let mut config = PosConfig::with_data_dir(dir.path());
        config.ticket_backend = crate::ticket::TicketBackend::Html;
        let ctx = Context {
            config,
            db,
            cache,
            auth,
            session,
            json: false,
        };
        (ctx, dir)
    }

    pub fn admin() -> (Context, tempfile::TempDir) {
        context("admin", "admin")
    }

    pub fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).expect("utf8 output")
    }
}
