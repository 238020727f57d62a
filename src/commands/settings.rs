//! Stored settings, user accounts, demo data and session info.

use serde_json::json;
use std::io::Write;
use tracing::info;

use super::Context;
use crate::auth::{self, Role, Section};
use crate::cli::{ConfigCmd, UsersCmd, VERSION};
use crate::config::{self, SETTING_KEYS};
use crate::db;
use crate::error::{PosError, Result};

fn require_admin(ctx: &Context) -> Result<()> {
    if ctx.session.role == Role::Admin {
        Ok(())
    } else {
        Err(PosError::Unauthorized(format!(
            "{} cannot change settings or users",
            ctx.session.role
        )))
    }
}

fn config_lines(ctx: &Context) -> Vec<String> {
    let c = &ctx.config;
    vec![
        format!("data_dir        {}", c.data_dir.display()),
        format!("db_path         {}", c.db_path.display()),
        format!("tickets_dir     {}", c.tickets_dir.display()),
        format!("sim_tickets_dir {}", c.simulation_tickets_dir.display()),
        format!("log_dir         {}", c.log_dir.display()),
        format!("store_name      {}", c.store_name),
        format!("ticket_backend  {}", c.ticket_backend),
        format!("open_tickets    {}", c.open_tickets),
    ]
}

pub fn config(ctx: &mut Context, action: ConfigCmd, out: &mut dyn Write) -> Result<()> {
    match action {
        ConfigCmd::Get { key: None } => ctx.emit(out, &ctx.config, config_lines(ctx)),
        ConfigCmd::Get { key: Some(key) } => {
            let stored = {
                let conn = ctx.db.lock()?;
                config::get_setting(&conn, &key)?
            };
            let line = match &stored {
                Some(value) => format!("{key} = {value}"),
                None => format!("{key} is not set"),
            };
            ctx.emit(out, &json!({ "key": key, "value": stored }), vec![line])
        }
        ConfigCmd::Set { key, value } => {
            require_admin(ctx)?;
            {
                let conn = ctx.db.lock()?;
                config::set_setting(&conn, &key, &value)?;
                ctx.config.apply_settings(&conn)?;
            }
            info!(key = %key, user = %ctx.session.username, "Setting changed");
            ctx.emit(
                out,
                &json!({ "key": key, "value": value.trim() }),
                vec![format!("{key} = {}", value.trim())],
            )
        }
    }
}

pub fn users(ctx: &mut Context, action: UsersCmd, out: &mut dyn Write) -> Result<()> {
    require_admin(ctx)?;
    match action {
        UsersCmd::List => {
            let list = {
                let conn = ctx.db.lock()?;
                auth::list_users(&conn)?
            };
            let mut lines = vec![format!("{:>4}  {:<16} {:<10} {}", "ID", "User", "Role", "Active")];
            lines.extend(list.iter().map(|u| {
                format!(
                    "{:>4}  {:<16} {:<10} {}",
                    u.id,
                    u.username,
                    u.role,
                    if u.active { "yes" } else { "no" }
                )
            }));
            ctx.emit(out, &list, lines)
        }
        UsersCmd::Add {
            username,
            role,
            password,
        } => {
            let id = {
                let conn = ctx.db.lock()?;
                auth::create_user(&conn, &username, &password, role, bcrypt::DEFAULT_COST)?
            };
            ctx.emit(
                out,
                &json!({ "id": id, "username": username.trim(), "role": role }),
                vec![format!("User {} ({role}) created with id {id}", username.trim())],
            )
        }
    }
}

pub fn seed(ctx: &mut Context, out: &mut dyn Write) -> Result<()> {
    require_admin(ctx)?;
    let inserted = {
        let conn = ctx.db.lock()?;
        db::seed_demo_data(&conn)?
    };
    ctx.refresh_cache();
    let message = if inserted == 0 {
        "Catalog already has products; nothing seeded".to_string()
    } else {
        format!("Seeded {inserted} demo products")
    };
    ctx.emit(out, &json!({ "products": inserted }), vec![message])
}

pub fn whoami(ctx: &mut Context, out: &mut dyn Write) -> Result<()> {
    let session = ctx
        .auth
        .current()?
        .ok_or_else(|| PosError::Unauthorized("not logged in".into()))?;
    let sections: Vec<&str> = session.role.sections().iter().map(|s| s.label()).collect();
    let lines = vec![
        format!("User:     {} ({})", session.username, session.role),
        format!("Session:  {}", session.session_id),
        format!("Since:    {}", session.login_time.to_rfc3339()),
        format!("Access:   {}", sections.join(", ")),
        format!("Home:     {}", session.role.initial_section().label()),
        format!("Version:  {VERSION}"),
        format!("Settings: {}", SETTING_KEYS.join(", ")),
    ];
    let value = json!({
        "session": session,
        "sections": Section::ALL
            .iter()
            .filter(|s| session.role.can_access(**s))
            .map(|s| s.label())
            .collect::<Vec<_>>(),
        "version": VERSION,
    });
    ctx.emit(out, &value, lines)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::super::testing::{admin, context, output};
    use super::*;
    use crate::ticket::TicketBackend;

    #[test]
    fn admin_sets_and_reads_a_setting() {
        let (mut ctx, _dir) = admin();
        config(
            &mut ctx,
            ConfigCmd::Set {
                key: "store_name".into(),
                value: "  Almacén Don Pepe ".into(),
            },
            &mut Vec::new(),
        )
        .expect("set");
        assert_eq!(ctx.config.store_name, "Almacén Don Pepe");

        let mut out = Vec::new();
        config(&mut ctx, ConfigCmd::Get { key: Some("store_name".into()) }, &mut out)
            .expect("get");
        assert_eq!(output(out).trim(), "store_name = Almacén Don Pepe");

        let err = config(
            &mut ctx,
            ConfigCmd::Set {
                key: "ticket_backend".into(),
                value: "fax".into(),
            },
            &mut Vec::new(),
        )
        .expect_err("bad backend");
        assert!(matches!(err, PosError::Config(_)));
        assert_eq!(ctx.config.ticket_backend, TicketBackend::Html);
    }

    #[test]
    fn cashier_reads_config_but_cannot_change_it() {
        let (mut ctx, _dir) = context("cajero1", "cajero");
        let mut out = Vec::new();
        config(&mut ctx, ConfigCmd::Get { key: None }, &mut out).expect("get");
        assert!(output(out).contains("ticket_backend  html"));

        let err = config(
            &mut ctx,
            ConfigCmd::Set {
                key: "open_tickets".into(),
                value: "yes".into(),
            },
            &mut Vec::new(),
        )
        .expect_err("denied");
        assert!(matches!(err, PosError::Unauthorized(_)));
        assert!(matches!(
            users(&mut ctx, UsersCmd::List, &mut Vec::new()),
            Err(PosError::Unauthorized(_))
        ));
    }

    #[test]
    fn admin_lists_default_users() {
        let (mut ctx, _dir) = admin();
        let mut out = Vec::new();
        users(&mut ctx, UsersCmd::List, &mut out).expect("list");
        let text = output(out);
        for name in ["admin", "cajero1", "cajero2", "deposito"] {
            assert!(text.contains(name), "{name} missing in {text}");
        }
    }

    #[test]
    fn seed_is_a_no_op_on_a_stocked_catalog() {
        let (mut ctx, _dir) = admin();
        let mut out = Vec::new();
        seed(&mut ctx, &mut out).expect("seed");
        assert!(output(out).contains("nothing seeded"));
        assert_eq!(ctx.cache.products.len(), 15);
    }

    #[test]
    fn whoami_reports_role_sections() {
        let (mut ctx, _dir) = context("deposito", "deposito");
        let mut out = Vec::new();
        whoami(&mut ctx, &mut out).expect("whoami");
        let text = output(out);
        assert!(text.contains("User:     deposito (deposito)"), "{text}");
        assert!(text.contains("Access:   Products\n"), "{text}");

        ctx.auth.logout().expect("logout");
        assert!(matches!(
            whoami(&mut ctx, &mut Vec::new()),
            Err(PosError::Unauthorized(_))
        ));
    }
}
