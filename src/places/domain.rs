use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::validation::{ErrorKind, ValidationErrors};

/// WGS 84, the reference system every stored coordinate is expressed in.
pub const SRID: u32 = 4326;

/// Mean earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceType {
    Restaurant,
    CoffeeShop,
    Mall,
    Hotel,
    Other,
}

impl PlaceType {
    pub const ALL: [PlaceType; 5] = [
        PlaceType::Restaurant,
        PlaceType::CoffeeShop,
        PlaceType::Mall,
        PlaceType::Hotel,
        PlaceType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlaceType::Restaurant => "restaurant",
            PlaceType::CoffeeShop => "coffee_shop",
            PlaceType::Mall => "mall",
            PlaceType::Hotel => "hotel",
            PlaceType::Other => "other",
        }
    }
}

impl fmt::Display for PlaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown place type: {0}")]
pub struct UnknownPlaceType(pub String);

impl FromStr for PlaceType {
    type Err = UnknownPlaceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlaceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownPlaceType(s.to_string()))
    }
}

impl ToSql for PlaceType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PlaceType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoordinateError {
    #[error("expected WKT like `POINT (lon lat)`, got `{0}`")]
    Malformed(String),

    #[error("coordinate out of range: longitude {longitude}, latitude {latitude}")]
    OutOfRange { longitude: f64, latitude: f64 },

    #[error("unsupported SRID {0}")]
    UnsupportedSrid(u32),
}

/// A point on the WGS 84 ellipsoid in degrees, with altitude in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub longitude: f64,
    pub latitude: f64,
    #[serde(default)]
    pub altitude: f64,
}

impl Coordinate {
    pub fn new(longitude: f64, latitude: f64) -> Result<Self, CoordinateError> {
        Self::with_altitude(longitude, latitude, 0.0)
    }

    pub fn with_altitude(
        longitude: f64,
        latitude: f64,
        altitude: f64,
    ) -> Result<Self, CoordinateError> {
        let coordinate = Self {
            longitude,
            latitude,
            altitude,
        };
        if coordinate.in_range() {
            Ok(coordinate)
        } else {
            Err(CoordinateError::OutOfRange {
                longitude,
                latitude,
            })
        }
    }

    pub fn in_range(&self) -> bool {
        self.longitude.is_finite()
            && self.latitude.is_finite()
            && self.altitude.is_finite()
            && (-180.0..=180.0).contains(&self.longitude)
            && (-90.0..=90.0).contains(&self.latitude)
    }

    /// Great-circle distance in meters (haversine), ignoring altitude.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }

    /// Latitude/longitude box enclosing every point within `radius_m`.
    /// `None` for longitude when the box would wrap or reach a pole.
    pub fn bounding_box(&self, radius_m: f64) -> ((f64, f64), Option<(f64, f64)>) {
        let dlat = (radius_m / EARTH_RADIUS_M).to_degrees();
        let lat_range = (
            (self.latitude - dlat).max(-90.0),
            (self.latitude + dlat).min(90.0),
        );

        let max_abs_lat = lat_range.0.abs().max(lat_range.1.abs());
        if max_abs_lat >= 90.0 {
            return (lat_range, None);
        }
        let dlon = dlat / max_abs_lat.to_radians().cos();
        let lon_range = (self.longitude - dlon, self.longitude + dlon);
        if lon_range.0 < -180.0 || lon_range.1 > 180.0 {
            (lat_range, None)
        } else {
            (lat_range, Some(lon_range))
        }
    }
}

impl Coordinate {
    /// Extended WKT with the reference system spelled out, as PostGIS prints it.
    pub fn to_ewkt(&self) -> String {
        format!("SRID={};{}", SRID, self)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.altitude == 0.0 {
            write!(f, "POINT ({} {})", self.longitude, self.latitude)
        } else {
            write!(
                f,
                "POINT ({} {} {})",
                self.longitude, self.latitude, self.altitude
            )
        }
    }
}

impl FromStr for Coordinate {
    type Err = CoordinateError;

    /// Accepts `POINT (lon lat)`, `POINT (lon lat alt)` and `POINT Z (lon lat alt)`,
    /// optionally prefixed by `SRID=4326;`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || CoordinateError::Malformed(s.to_string());

        let upper = s.trim().to_ascii_uppercase();
        let wkt = match upper.strip_prefix("SRID=") {
            Some(tagged) => {
                let (srid, wkt) = tagged.split_once(';').ok_or_else(malformed)?;
                let srid: u32 = srid.trim().parse().map_err(|_| malformed())?;
                if srid != SRID {
                    return Err(CoordinateError::UnsupportedSrid(srid));
                }
                wkt.trim_start()
            }
            None => upper.as_str(),
        };
        let rest = wkt.strip_prefix("POINT").ok_or_else(malformed)?.trim_start();
        let rest = rest.strip_prefix('Z').map(str::trim_start).unwrap_or(rest);
        let inner = rest
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .ok_or_else(malformed)?;

        let values = inner
            .split_whitespace()
            .map(str::parse::<f64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| malformed())?;

        match values.as_slice() {
            [lon, lat] => Coordinate::new(*lon, *lat),
            [lon, lat, alt] => Coordinate::with_altitude(*lon, *lat, *alt),
            _ => Err(malformed()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceId(pub String);

impl PlaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Place {
    pub id: PlaceId,
    pub coordinate: Coordinate,
    pub locale: String,
    pub name: String,
    pub place_type: PlaceType,
    pub created_at: String,
    pub updated_at: String,
}

/// Submitted place attributes. `place_type` is raw input so that an unknown
/// category surfaces as a field error rather than a parse failure.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPlace {
    pub coordinate: Option<Coordinate>,
    pub locale: String,
    pub name: String,
    pub place_type: String,
}

/// A `NewPlace` that passed every check not needing the database.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidPlace {
    pub coordinate: Coordinate,
    pub locale: String,
    pub name: String,
    pub place_type: PlaceType,
}

impl NewPlace {
    pub fn new(
        coordinate: Coordinate,
        locale: impl Into<String>,
        name: impl Into<String>,
        place_type: impl Into<String>,
    ) -> Self {
        Self {
            coordinate: Some(coordinate),
            locale: locale.into(),
            name: name.into(),
            place_type: place_type.into(),
        }
    }

    pub fn validate(&self) -> Result<ValidPlace, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        match self.coordinate {
            None => errors.add("coordinate", ErrorKind::Blank),
            Some(c) if !c.in_range() => errors.add("coordinate", ErrorKind::Invalid),
            Some(_) => {}
        }
        errors.require("locale", &self.locale);
        errors.require("name", &self.name);

        let place_type = if errors.require("place_type", &self.place_type) {
            let parsed = self.place_type.parse::<PlaceType>().ok();
            if parsed.is_none() {
                errors.add("place_type", ErrorKind::Inclusion);
            }
            parsed
        } else {
            None
        };

        match (self.coordinate, place_type) {
            (Some(coordinate), Some(place_type)) if errors.is_empty() => Ok(ValidPlace {
                coordinate,
                locale: self.locale.clone(),
                name: self.name.clone(),
                place_type,
            }),
            _ => Err(errors),
        }
    }
}
