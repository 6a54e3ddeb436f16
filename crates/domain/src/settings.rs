//! Per-service runtime settings.
//!
//! Everything here is edited from the dashboard and stored as JSON blobs in
//! the state store; during a call the flow only reads. Defaults are chosen
//! so a blank deployment still answers calls sensibly.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Providers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A contact person at a provider location. `position` orders the dial
/// queue.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Contact {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub position: u32,
}

/// A service-provider location with its dialable contacts.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderLocation {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

impl ProviderLocation {
    /// Contacts ordered by `position` ascending; queue population and the
    /// quoted provider phone both follow this order.
    pub fn contacts_in_order(&self) -> Vec<Contact> {
        let mut contacts = self.contacts.clone();
        contacts.sort_by_key(|c| c.position);
        contacts
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EmergencyContact {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pricing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One pricing tier. A route duration of `m` minutes matches the first
/// tier with `m < minutes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingTier {
    pub minutes: u32,
    #[serde(rename = "dayPrice")]
    pub day_price: u32,
    #[serde(rename = "nightPrice")]
    pub night_price: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Pricing {
    #[serde(default)]
    pub tiers: Vec<PricingTier>,
    #[serde(rename = "fallbackDayPrice", default)]
    pub fallback_day_price: u32,
    #[serde(rename = "fallbackNightPrice", default)]
    pub fallback_night_price: u32,
}

/// Day/night boundary. Hour `day_start` is day, hour `day_end` is night.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveHours {
    #[serde(default = "default_day_start")]
    pub day_start: u32,
    #[serde(default = "default_day_end")]
    pub day_end: u32,
}

fn default_day_start() -> u32 {
    8
}

fn default_day_end() -> u32 {
    20
}

impl Default for ActiveHours {
    fn default() -> Self {
        Self {
            day_start: default_day_start(),
            day_end: default_day_end(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Forwarding / transfer behavior
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Night-shift style forwarding: inside the hour window, inbound calls are
/// dialed straight through without entering the flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectForwarding {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub forward_phone: String,
    #[serde(default)]
    pub start_hour: f64,
    #[serde(default = "default_forward_end")]
    pub end_hour: f64,
}

fn default_forward_end() -> f64 {
    6.0
}

impl Default for DirectForwarding {
    fn default() -> Self {
        Self {
            active: false,
            forward_phone: String::new(),
            start_hour: 0.0,
            end_hour: default_forward_end(),
        }
    }
}

impl DirectForwarding {
    /// Whether forwarding applies at the given fractional hour of day.
    pub fn applies_at(&self, hour: f64) -> bool {
        self.active
            && !self.forward_phone.is_empty()
            && self.start_hour <= hour
            && hour < self.end_hour
    }
}

/// Global vacation mode. While active, direct forwarding is suppressed.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VacationMode {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub substitute_phone: String,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Seconds a contact's phone rings before the queue advances.
    #[serde(default = "default_ring_timeout")]
    pub ring_timeout: u32,
}

fn default_ring_timeout() -> u32 {
    15
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            ring_timeout: default_ring_timeout(),
        }
    }
}

/// The phone number callers dial to reach this service.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceNumber {
    #[serde(default)]
    pub phone_number: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Announcements
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// All spoken prompts of the flow, editable per service. Fields missing in
/// a stored blob fall back to the German defaults, so partial edits from
/// the dashboard never blank a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Announcements {
    pub greeting: String,
    pub greeting_prompt: String,
    pub intent_not_understood: String,
    pub address_request: String,
    pub address_processing: String,
    /// `{place_phrase}` is replaced with the recognized postal code and
    /// city.
    pub address_confirm: String,
    pub address_confirm_prompt: String,
    pub zipcode_request: String,
    pub plz_invalid_format: String,
    pub plz_outside_area: String,
    pub plz_not_found: String,
    pub sms_offer: String,
    pub sms_sent_confirmation: String,
    /// `{price}` and `{minutes}` are replaced with the quote.
    pub price_offer: String,
    pub price_offer_prompt: String,
    pub connection_declined: String,
    pub transfer_message: String,
    pub no_agents_available: String,
    pub technical_error: String,
}

impl Default for Announcements {
    fn default() -> Self {
        Self {
            greeting: "Hallo, hier ist die Notdienststation. Wie kann ich dir helfen?".into(),
            greeting_prompt: "Bitte beschreibe dein Anliegen damit ich dich mit dem richtigen Ansprechpartner verbinden kann.".into(),
            intent_not_understood: "Leider konnte ich deine Anfrage nicht verstehen. Wie kann ich dir helfen?".into(),
            address_request: "Um die Kosten und Wartezeit zu berechnen, benötige ich deine Adresse. Bitte nenne mir Straße, Hausnummer, Postleitzahl und Ort.".into(),
            address_processing: "Einen Moment, ich prüfe die Verfügbarkeit an deiner Adresse.".into(),
            address_confirm: "Als Ort habe ich {place_phrase} erkannt. Ist das richtig?".into(),
            address_confirm_prompt: "Bitte bestätige mit ja oder nein, ob die Adresse korrekt ist.".into(),
            zipcode_request: "Bitte gib die Postleitzahl deines Ortes über den Nummernblock ein.".into(),
            plz_invalid_format: "Die Postleitzahl konnte nicht erkannt werden. Bitte versuche es erneut.".into(),
            plz_outside_area: "Diese Postleitzahl liegt außerhalb unseres Servicegebiets.".into(),
            plz_not_found: "Diese Postleitzahl konnte nicht gefunden werden.".into(),
            sms_offer: "Wir können dir eine SMS mit einem Link zusenden, der uns deinen Standort übermittelt. Möchtest du das?".into(),
            sms_sent_confirmation: "Wir haben soeben eine SMS mit dem Link versendet. Bitte öffne den Link und teile uns deinen Standort mit. Wir rufen dich anschließend zurück.".into(),
            price_offer: "Die Kosten betragen {price} Euro und die Wartezeit beträgt {minutes} Minuten. Möchtest du jetzt verbunden werden?".into(),
            price_offer_prompt: "Bitte sage ja oder nein.".into(),
            connection_declined: "Vielen Dank für deinen Anruf. Wir wünschen dir noch einen schönen Tag.".into(),
            transfer_message: "Ich verbinde dich mit einem Mitarbeiter.".into(),
            no_agents_available: "Leider ist momentan niemand erreichbar. Bitte versuche es später erneut.".into(),
            technical_error: "Ein technischer Fehler ist aufgetreten. Bitte versuche es später erneut.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contacts_sorted_by_position() {
        let location = ProviderLocation {
            contacts: vec![
                Contact {
                    name: "Bob".into(),
                    phone: "+492222".into(),
                    position: 2,
                },
                Contact {
                    name: "Alice".into(),
                    phone: "+491111".into(),
                    position: 0,
                },
                Contact {
                    name: "Carol".into(),
                    phone: "+493333".into(),
                    position: 1,
                },
            ],
            ..Default::default()
        };
        let ordered: Vec<String> = location
            .contacts_in_order()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(ordered, vec!["Alice", "Carol", "Bob"]);
    }

    #[test]
    fn pricing_deserializes_camel_case_keys() {
        let pricing: Pricing = serde_json::from_str(
            r#"{"tiers":[{"minutes":15,"dayPrice":100,"nightPrice":150}],
                "fallbackDayPrice":400,"fallbackNightPrice":450}"#,
        )
        .unwrap();
        assert_eq!(pricing.tiers[0].day_price, 100);
        assert_eq!(pricing.fallback_night_price, 450);
    }

    #[test]
    fn direct_forwarding_window() {
        let forwarding = DirectForwarding {
            active: true,
            forward_phone: "+49111".into(),
            start_hour: 22.0,
            end_hour: 23.5,
        };
        assert!(forwarding.applies_at(22.0));
        assert!(forwarding.applies_at(23.0));
        assert!(!forwarding.applies_at(23.5));
        assert!(!forwarding.applies_at(12.0));
    }

    #[test]
    fn forwarding_without_number_never_applies() {
        let forwarding = DirectForwarding {
            active: true,
            ..Default::default()
        };
        assert!(!forwarding.applies_at(3.0));
    }

    #[test]
    fn announcement_defaults_are_german() {
        let a = Announcements::default();
        assert!(a.greeting.contains("Notdienststation"));
        assert!(a.price_offer.contains("{price}"));
    }
}
