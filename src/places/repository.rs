use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{self, DbPool};
use crate::error::{ModelError, ModelResult};
use crate::places::domain::*;
use crate::validation::{ErrorKind, ValidationErrors};

pub(crate) const PLACE_COLUMNS: &str =
    "p.id, p.longitude, p.latitude, p.altitude, p.locale, p.name, p.place_type, p.created_at, p.updated_at";

pub(crate) fn place_from_row(row: &Row<'_>) -> rusqlite::Result<Place> {
    Ok(Place {
        id: PlaceId(row.get(0)?),
        coordinate: Coordinate {
            longitude: row.get(1)?,
            latitude: row.get(2)?,
            altitude: row.get(3)?,
        },
        locale: row.get(4)?,
        name: row.get(5)?,
        place_type: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub(crate) fn load_place(conn: &Connection, id: &PlaceId) -> ModelResult<Option<Place>> {
    Ok(conn
        .query_row(
            &format!("SELECT {PLACE_COLUMNS} FROM places p WHERE p.id = ?1"),
            params![id.as_str()],
            place_from_row,
        )
        .optional()?)
}

fn coordinate_taken(conn: &Connection, locale: &str, c: &Coordinate) -> ModelResult<bool> {
    Ok(conn.query_row(
        "SELECT COUNT(*) > 0 FROM places
         WHERE locale = ?1 AND longitude = ?2 AND latitude = ?3 AND altitude = ?4",
        params![locale, c.longitude, c.latitude, c.altitude],
        |row| row.get(0),
    )?)
}

fn taken() -> ModelError {
    let mut errors = ValidationErrors::new();
    errors.add("coordinate", ErrorKind::Taken);
    errors.into()
}

pub fn create_place(pool: &DbPool, new_place: NewPlace) -> ModelResult<Place> {
    let place = new_place.validate()?;
    let conn = pool.get()?;

    if coordinate_taken(&conn, &place.locale, &place.coordinate)? {
        return Err(taken());
    }

    let id = PlaceId::new(db::new_id());
    conn.execute(
        "INSERT INTO places (id, longitude, latitude, altitude, locale, name, place_type)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id.as_str(),
            place.coordinate.longitude,
            place.coordinate.latitude,
            place.coordinate.altitude,
            place.locale,
            place.name,
            place.place_type,
        ],
    )
    .map_err(|e| {
        if db::unique_violation_columns(&e).is_some() {
            taken()
        } else {
            e.into()
        }
    })?;

    tracing::info!(place_id = %id, name = %place.name, coordinate = %place.coordinate, "Created place");
    load_place(&conn, &id)?.ok_or_else(|| ModelError::not_found("place", id.as_str()))
}

pub fn find_place(pool: &DbPool, id: &PlaceId) -> ModelResult<Place> {
    let conn = pool.get()?;
    load_place(&conn, id)?.ok_or_else(|| ModelError::not_found("place", id.as_str()))
}

pub fn places_in_locale(pool: &DbPool, locale: &str) -> ModelResult<Vec<Place>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {PLACE_COLUMNS} FROM places p WHERE p.locale = ?1 ORDER BY p.name, p.rowid"
    ))?;
    let places = stmt
        .query_map(params![locale], place_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(places)
}

/// Places within `radius_m` meters of `center`, nearest first, paired with
/// their distance in meters.
pub fn places_near(
    pool: &DbPool,
    center: &Coordinate,
    radius_m: f64,
) -> ModelResult<Vec<(Place, f64)>> {
    let conn = pool.get()?;
    let ((min_lat, max_lat), lon_range) = center.bounding_box(radius_m.max(0.0));
    let (min_lon, max_lon) = lon_range.unwrap_or((-180.0, 180.0));

    let mut stmt = conn.prepare(&format!(
        "SELECT {PLACE_COLUMNS} FROM places p
         WHERE p.latitude BETWEEN ?1 AND ?2 AND p.longitude BETWEEN ?3 AND ?4"
    ))?;
    let candidates = stmt
        .query_map(params![min_lat, max_lat, min_lon, max_lon], place_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut nearby: Vec<(Place, f64)> = candidates
        .into_iter()
        .map(|place| {
            let distance = center.distance_to(&place.coordinate);
            (place, distance)
        })
        .filter(|(_, distance)| *distance <= radius_m)
        .collect();
    nearby.sort_by(|a, b| a.1.total_cmp(&b.1));

    tracing::debug!(center = %center, radius_m, count = nearby.len(), "Loaded nearby places");
    Ok(nearby)
}
