//! Transfer queue population and the dial coordinator.
//!
//! The queue is built once (from the priced provider, or the default set
//! for plain human-takeover paths) and then consumed head-first by
//! `start_transfer`, which dials exactly one contact per TwiML response.
//! The status callback advances the queue, so a call makes at most N+1
//! dial attempts for a queue of length N.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use nd_domain::settings::{EmergencyContact, ProviderLocation};
use nd_domain::Result;
use nd_store::{CallStore, QueueEntry};

use crate::state::AppState;
use crate::twiml::VoiceResponse;

/// Outcome of a `start_transfer` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStart {
    /// A dial verb was appended; the status callback continues the loop.
    Dialing,
    /// The queue is empty; the caller must be told and hung up.
    NoMoreAgents,
}

// ── Queue construction (pure) ────────────────────────────────────

/// Contacts for the chosen provider location, ordered by position. When no
/// location matches, the emergency contact is the single fallback entry.
pub fn queue_for_provider(
    locations: &[ProviderLocation],
    emergency: &EmergencyContact,
    provider_name: &str,
) -> Vec<QueueEntry> {
    let matched = locations
        .iter()
        .find(|l| l.name.eq_ignore_ascii_case(provider_name));

    match matched {
        Some(location) => location
            .contacts_in_order()
            .into_iter()
            .filter(|c| !c.name.is_empty() && !c.phone.is_empty())
            .map(|c| QueueEntry {
                name: c.name,
                phone: c.phone,
            })
            .collect(),
        None => {
            tracing::warn!(provider_name, "no location matched, using emergency contact");
            emergency_entry(emergency).into_iter().collect()
        }
    }
}

/// Every contact of every location, in location order then position order.
/// Used for human-takeover paths where no provider was chosen.
pub fn default_queue(
    locations: &[ProviderLocation],
    emergency: &EmergencyContact,
) -> Vec<QueueEntry> {
    let mut entries: Vec<QueueEntry> = locations
        .iter()
        .flat_map(|location| location.contacts_in_order())
        .filter(|c| !c.name.is_empty() && !c.phone.is_empty())
        .map(|c| QueueEntry {
            name: c.name,
            phone: c.phone,
        })
        .collect();

    if entries.is_empty() {
        entries.extend(emergency_entry(emergency));
    }
    entries
}

fn emergency_entry(emergency: &EmergencyContact) -> Option<QueueEntry> {
    if emergency.name.is_empty() || emergency.phone.is_empty() {
        return None;
    }
    Some(QueueEntry {
        name: emergency.name.clone(),
        phone: emergency.phone.clone(),
    })
}

// ── Store operations ─────────────────────────────────────────────

/// Replace the caller's queue with the given entries.
pub async fn populate_queue(
    store: &CallStore,
    caller: &str,
    entries: &[QueueEntry],
) -> Result<()> {
    store.clear_caller_queue(caller).await?;
    for entry in entries {
        store
            .add_to_caller_queue(caller, &entry.name, &entry.phone)
            .await?;
    }
    tracing::info!(caller, count = entries.len(), "transfer queue populated");
    Ok(())
}

/// Populate the default queue if the caller has none yet.
pub async fn ensure_queue(state: &AppState, caller: &str, service: &str) -> Result<()> {
    if state.calls.get_next_caller_in_queue(caller).await?.is_some() {
        return Ok(());
    }
    let locations = state.settings.locations(service).await?;
    let emergency = state.settings.emergency_contact(service).await?;
    populate_queue(&state.calls, caller, &default_queue(&locations, &emergency)).await
}

/// Append a dial to the head of the queue without removing it. The status
/// callback (`/parse-transfer-call/{name}/{phone}`) decides whether to pop
/// and redial or to finish the call.
pub async fn start_transfer(
    state: &AppState,
    response: &mut VoiceResponse,
    caller: &str,
    service: &str,
) -> Result<TransferStart> {
    let Some(head) = state.calls.get_next_caller_in_queue(caller).await? else {
        return Ok(TransferStart::NoMoreAgents);
    };

    let ring_timeout = state.settings.transfer_settings(service).await?.ring_timeout;
    let action = format!(
        "/parse-transfer-call/{}/{}",
        utf8_percent_encode(&head.name, NON_ALPHANUMERIC),
        utf8_percent_encode(&head.phone, NON_ALPHANUMERIC)
    );

    tracing::info!(caller, contact = %head.name, phone = %head.phone, "dialing transfer target");
    response.dial(head.phone.clone(), Some(action), Some(ring_timeout), None);
    Ok(TransferStart::Dialing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nd_domain::settings::Contact;

    fn location(name: &str, contacts: &[(&str, &str, u32)]) -> ProviderLocation {
        ProviderLocation {
            name: name.into(),
            contacts: contacts
                .iter()
                .map(|(name, phone, position)| Contact {
                    name: name.to_string(),
                    phone: phone.to_string(),
                    position: *position,
                })
                .collect(),
            ..Default::default()
        }
    }

    fn emergency() -> EmergencyContact {
        EmergencyContact {
            name: "Notfall".into(),
            phone: "+49999".into(),
        }
    }

    #[test]
    fn provider_queue_is_ordered_by_position() {
        let locations = vec![
            location("Provider A", &[("Bob", "+492", 1), ("Alice", "+491", 0)]),
            location("Provider B", &[("Zoe", "+493", 0)]),
        ];
        let queue = queue_for_provider(&locations, &emergency(), "provider a");
        let names: Vec<&str> = queue.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
    }

    #[test]
    fn unmatched_provider_falls_back_to_emergency() {
        let locations = vec![location("Provider A", &[("Alice", "+491", 0)])];
        let queue = queue_for_provider(&locations, &emergency(), "Nowhere");
        assert_eq!(
            queue,
            vec![QueueEntry {
                name: "Notfall".into(),
                phone: "+49999".into()
            }]
        );
    }

    #[test]
    fn unmatched_provider_without_emergency_is_empty() {
        let locations = vec![location("Provider A", &[("Alice", "+491", 0)])];
        let queue = queue_for_provider(&locations, &EmergencyContact::default(), "Nowhere");
        assert!(queue.is_empty());
    }

    #[test]
    fn incomplete_contacts_are_skipped() {
        let locations = vec![location(
            "Provider A",
            &[("", "+491", 0), ("NoPhone", "", 1), ("Ok", "+492", 2)],
        )];
        let queue = queue_for_provider(&locations, &emergency(), "Provider A");
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].name, "Ok");
    }

    #[test]
    fn default_queue_spans_all_locations() {
        let locations = vec![
            location("A", &[("Alice", "+491", 0)]),
            location("B", &[("Bob", "+492", 0), ("Carol", "+493", 1)]),
        ];
        let queue = default_queue(&locations, &emergency());
        let names: Vec<&str> = queue.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob", "Carol"]);
    }

    #[test]
    fn default_queue_falls_back_to_emergency() {
        let queue = default_queue(&[], &emergency());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].name, "Notfall");
    }
}
