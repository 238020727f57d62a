//! Points of sale (registers / counters).

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::error::{PosError, Result};
use crate::models::PointOfSale;

fn map_point(row: &Row<'_>) -> rusqlite::Result<PointOfSale> {
    Ok(PointOfSale {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        phone: row.get(3)?,
    })
}

pub fn list_points(conn: &Connection) -> Result<Vec<PointOfSale>> {
    let mut stmt = conn
        .prepare("SELECT id, nombre, direccion, telefono FROM puntos_venta ORDER BY nombre")?;
    let rows = stmt
        .query_map([], map_point)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn find_point(conn: &Connection, id: i64) -> Result<Option<PointOfSale>> {
    Ok(conn
        .query_row(
            "SELECT id, nombre, direccion, telefono FROM puntos_venta WHERE id = ?1",
            params![id],
            map_point,
        )
        .optional()?)
}

pub fn add_point(conn: &Connection, name: &str, address: &str, phone: &str) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PosError::validation("point of sale name is required"));
    }
    conn.execute(
        "INSERT INTO puntos_venta (nombre, direccion, telefono) VALUES (?1, ?2, ?3)",
        params![name, address.trim(), phone.trim()],
    )?;
    let id = conn.last_insert_rowid();
    info!(point_id = id, name = %name, "Point of sale added");
    Ok(id)
}

/// Register used when the operator does not pick one: the first whose name
/// mentions "cliente" or "pc", otherwise the first listed.
pub fn default_point(points: &[PointOfSale]) -> Option<&PointOfSale> {
    points
        .iter()
        .find(|p| {
            let name = p.name.to_lowercase();
            name.contains("cliente") || name.contains("pc")
        })
        .or_else(|| points.first())
}
