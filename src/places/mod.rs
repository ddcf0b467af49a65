pub mod domain;
pub mod repository;

pub use domain::{Coordinate, CoordinateError, NewPlace, Place, PlaceId, PlaceType, SRID};
pub use repository::{create_place, find_place, places_in_locale, places_near};
