//! Geocoding, routing, and price computation.

pub mod geocode;
pub mod pricing;
pub mod routes;

pub use geocode::{in_service_area, GeocodeClient, PLZ_REPAIR_LNG_SHIFT};
pub use pricing::{get_price, is_daytime_hour, price_for_duration, Quote};
pub use routes::{Route, RoutesClient};
