//! Tiered day/night pricing on top of the routes client.

use nd_domain::settings::{ActiveHours, Pricing, ProviderLocation};
use nd_domain::{Error, Result};

use crate::routes::{Route, RoutesClient};

/// Minimum ETA quoted to callers, in minutes.
const MIN_QUOTED_MINUTES: u64 = 10;

/// A finished price quote for the closest reachable provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub price: u32,
    /// Customer-facing ETA, floored at ten minutes.
    pub eta_minutes: u64,
    pub provider_name: String,
    pub provider_phone: String,
}

// ── Day/night ────────────────────────────────────────────────────

/// Hour `day_start` counts as day, hour `day_end` counts as night.
pub fn is_daytime_hour(hour: u32, active_hours: &ActiveHours) -> bool {
    active_hours.day_start <= hour && hour < active_hours.day_end
}

/// Current Berlin-local hour against the service's active hours.
pub fn is_daytime_now(active_hours: &ActiveHours) -> bool {
    use chrono::Timelike;
    let hour = chrono::Utc::now()
        .with_timezone(&chrono_tz::Europe::Berlin)
        .hour();
    is_daytime_hour(hour, active_hours)
}

// ── Tier selection ───────────────────────────────────────────────

/// Match the first tier with `minutes < tier.minutes`; overflow hits the
/// fallback prices. Returns `(price, raw_minutes)`.
pub fn price_for_duration(duration_seconds: u64, pricing: &Pricing, day: bool) -> (u32, u64) {
    let minutes = duration_seconds / 60;
    for tier in &pricing.tiers {
        if minutes < u64::from(tier.minutes) {
            let price = if day { tier.day_price } else { tier.night_price };
            return (price, minutes);
        }
    }
    let price = if day {
        pricing.fallback_day_price
    } else {
        pricing.fallback_night_price
    };
    (price, minutes)
}

// ── Closest provider ─────────────────────────────────────────────

/// Route to every provider location with a usable address and keep the one
/// with the shortest driving time. Route errors and empty results skip the
/// location rather than failing the lookup.
pub async fn closest_provider<'a>(
    routes: &RoutesClient,
    latitude: f64,
    longitude: f64,
    locations: &'a [ProviderLocation],
) -> Option<(&'a ProviderLocation, Route)> {
    let mut best: Option<(&ProviderLocation, Route)> = None;

    for location in locations {
        if location.address.trim().is_empty() {
            continue;
        }
        let route = match routes
            .drive_duration(latitude, longitude, &location.address)
            .await
        {
            Ok(Some(route)) => route,
            Ok(None) => {
                tracing::debug!(provider = %location.name, "no route found, skipping");
                continue;
            }
            Err(e) => {
                tracing::warn!(provider = %location.name, error = %e, "route lookup failed, skipping");
                continue;
            }
        };

        let closer = best
            .as_ref()
            .map(|(_, b)| route.duration_seconds < b.duration_seconds)
            .unwrap_or(true);
        if closer {
            best = Some((location, route));
        }
    }

    best
}

/// Full quote for a caller position: closest provider, tier price, ETA.
pub async fn get_price(
    routes: &RoutesClient,
    longitude: f64,
    latitude: f64,
    locations: &[ProviderLocation],
    pricing: &Pricing,
    active_hours: &ActiveHours,
) -> Result<Quote> {
    let (provider, route) = closest_provider(routes, latitude, longitude, locations)
        .await
        .ok_or_else(|| Error::Pricing("No reachable provider found".into()))?;

    let day = is_daytime_now(active_hours);
    let (price, minutes) = price_for_duration(route.duration_seconds, pricing, day);

    let provider_phone = provider
        .contacts_in_order()
        .first()
        .map(|c| c.phone.clone())
        .unwrap_or_default();

    tracing::info!(
        provider = %provider.name,
        duration_seconds = route.duration_seconds,
        price,
        day,
        "closest provider priced"
    );

    Ok(Quote {
        price,
        eta_minutes: minutes.max(MIN_QUOTED_MINUTES),
        provider_name: provider.name.clone(),
        provider_phone,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nd_domain::settings::PricingTier;

    fn sample_pricing() -> Pricing {
        Pricing {
            tiers: vec![
                PricingTier {
                    minutes: 15,
                    day_price: 100,
                    night_price: 150,
                },
                PricingTier {
                    minutes: 30,
                    day_price: 200,
                    night_price: 250,
                },
                PricingTier {
                    minutes: 60,
                    day_price: 300,
                    night_price: 350,
                },
            ],
            fallback_day_price: 400,
            fallback_night_price: 450,
        }
    }

    #[test]
    fn first_tier_day_and_night() {
        let pricing = sample_pricing();
        assert_eq!(price_for_duration(600, &pricing, true), (100, 10));
        assert_eq!(price_for_duration(600, &pricing, false), (150, 10));
    }

    #[test]
    fn middle_tiers() {
        let pricing = sample_pricing();
        assert_eq!(price_for_duration(1200, &pricing, true), (200, 20));
        assert_eq!(price_for_duration(2700, &pricing, true), (300, 45));
    }

    #[test]
    fn overflow_hits_fallback() {
        let pricing = sample_pricing();
        assert_eq!(price_for_duration(5400, &pricing, true), (400, 90));
        assert_eq!(price_for_duration(5400, &pricing, false), (450, 90));
    }

    #[test]
    fn exact_tier_boundary_moves_to_next_tier() {
        let pricing = sample_pricing();
        // Exactly 15 minutes is NOT < 15, so the second tier applies.
        assert_eq!(price_for_duration(900, &pricing, true), (200, 15));
    }

    #[test]
    fn zero_duration_matches_first_tier() {
        let pricing = sample_pricing();
        assert_eq!(price_for_duration(0, &pricing, true), (100, 0));
    }

    #[test]
    fn minutes_use_integer_division() {
        let pricing = sample_pricing();
        assert_eq!(price_for_duration(89, &pricing, true), (100, 1));
    }

    #[test]
    fn empty_tiers_use_fallback() {
        let pricing = Pricing {
            tiers: vec![],
            fallback_day_price: 400,
            fallback_night_price: 450,
        };
        assert_eq!(price_for_duration(600, &pricing, true), (400, 10));
    }

    #[test]
    fn day_night_boundaries() {
        let hours = ActiveHours {
            day_start: 8,
            day_end: 20,
        };
        assert!(is_daytime_hour(8, &hours)); // day_start is day
        assert!(is_daytime_hour(14, &hours));
        assert!(!is_daytime_hour(20, &hours)); // day_end is night
        assert!(!is_daytime_hour(5, &hours));
        assert!(!is_daytime_hour(23, &hours));
    }

    #[test]
    fn custom_active_hours() {
        let hours = ActiveHours {
            day_start: 6,
            day_end: 22,
        };
        assert!(is_daytime_hour(21, &hours));
        assert!(!is_daytime_hour(22, &hours));
    }

    #[test]
    fn eta_floor() {
        // minutes=3 is bumped to 10, minutes=10 stays, minutes=90 stays.
        assert_eq!(3u64.max(MIN_QUOTED_MINUTES), 10);
        assert_eq!(10u64.max(MIN_QUOTED_MINUTES), 10);
        assert_eq!(90u64.max(MIN_QUOTED_MINUTES), 90);
    }
}
