use crate::ports::ChatSummary;
use crate::Gateway;
use protocol::{ContactEntry, ServerEvent, SessionStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Single-flight guard: overlapping refresh requests coalesce into one extra rebuild.
#[derive(Debug, Default)]
pub(crate) struct RefreshGuard {
    in_flight: AtomicBool,
    pending: AtomicBool,
}

/// Projects the driver's conversation list into the sorted contacts view.
///
/// Group conversations are dropped. Ordering is newest last-message first; a missing
/// timestamp counts as 0 and ties keep the driver's order.
pub fn project_contacts(chats: Vec<ChatSummary>) -> Vec<ContactEntry> {
    let mut entries: Vec<ContactEntry> = chats
        .into_iter()
        .filter(|chat| !chat.is_group)
        .map(project_chat)
        .collect();
    entries.sort_by(|a, b| {
        let ta = a.last_message_timestamp.unwrap_or(0);
        let tb = b.last_message_timestamp.unwrap_or(0);
        tb.cmp(&ta)
    });
    entries
}

fn project_chat(chat: ChatSummary) -> ContactEntry {
    let display_name = non_empty(chat.name)
        .or_else(|| non_empty(chat.contact_pushname))
        .unwrap_or_else(|| chat.user.clone());
    let (last_message_body, last_message_timestamp) = match chat.last_message {
        Some(last) => (last.body, last.timestamp),
        None => (String::new(), None),
    };
    ContactEntry {
        id: chat.id,
        display_name,
        phone_digits: chat.user,
        is_group: chat.is_group,
        unread_count: chat.unread_count,
        last_message_body,
        last_message_timestamp,
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.is_empty())
}

impl Gateway {
    /// Rebuilds the contacts cache from the driver.
    ///
    /// Not connected: the cache is emptied and nothing is fetched. A fetch error
    /// leaves the previous snapshot in place.
    pub async fn refresh_contacts(&self) {
        {
            let mut state = self.state.write().await;
            if state.status() != SessionStatus::Connected {
                state.contacts.clear();
                return;
            }
        }

        loop {
            if self.refresh.in_flight.swap(true, Ordering::SeqCst) {
                self.refresh.pending.store(true, Ordering::SeqCst);
                debug!("Contacts refresh already running; coalesced");
                return;
            }
            loop {
                self.refresh.pending.store(false, Ordering::SeqCst);
                self.rebuild_contacts().await;
                if !self.refresh.pending.load(Ordering::SeqCst) {
                    break;
                }
            }
            self.refresh.in_flight.store(false, Ordering::SeqCst);
            // a request may have landed between the last check and the release
            if !self.refresh.pending.load(Ordering::SeqCst) {
                return;
            }
        }
    }

    async fn rebuild_contacts(&self) {
        let generation = self.generation();
        let chats = match self.driver.get_chats().await {
            Ok(chats) => chats,
            Err(e) => {
                error!("Error loading contacts: {:#}", e);
                return;
            }
        };
        let entries = project_contacts(chats);

        {
            let mut state = self.state.write().await;
            if self.generation() != generation || state.status() != SessionStatus::Connected {
                debug!("Discarding contacts fetched for a superseded session");
                return;
            }
            state.contacts = entries.clone();
        }
        debug!("Contacts cache rebuilt with {} entries", entries.len());
        self.hub.publish(ServerEvent::Contacts(entries));
    }

    /// Fire-and-forget refresh.
    pub(crate) fn spawn_contacts_refresh(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.refresh_contacts().await });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::LastMessage;

    fn chat(user: &str, ts: Option<i64>) -> ChatSummary {
        ChatSummary {
            id: format!("{}@c.us", user),
            user: user.into(),
            name: None,
            contact_pushname: None,
            is_group: false,
            unread_count: 0,
            last_message: ts.map(|t| LastMessage { body: format!("msg {}", user), timestamp: Some(t) }),
        }
    }

    #[test]
    fn sorts_newest_first_with_missing_last() {
        let chats = vec![chat("1", Some(10)), chat("2", None), chat("3", Some(30)), chat("4", Some(20))];
        let ids: Vec<_> = project_contacts(chats).into_iter().map(|c| c.phone_digits).collect();
        assert_eq!(ids, vec!["3", "4", "1", "2"]);
    }

    #[test]
    fn ties_keep_driver_order() {
        let chats = vec![chat("a", Some(5)), chat("b", None), chat("c", Some(5)), chat("d", None)];
        let ids: Vec<_> = project_contacts(chats).into_iter().map(|c| c.phone_digits).collect();
        assert_eq!(ids, vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn drops_groups() {
        let mut group = chat("999", Some(100));
        group.is_group = true;
        let entries = project_contacts(vec![group, chat("1", Some(1))]);
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].is_group);
    }

    #[test]
    fn name_resolution_order() {
        let mut named = chat("1", None);
        named.name = Some("Ana".into());
        named.contact_pushname = Some("ana_push".into());
        let mut pushed = chat("2", None);
        pushed.name = Some(String::new());
        pushed.contact_pushname = Some("Bo".into());
        let bare = chat("3", None);

        let entries = project_contacts(vec![named, pushed, bare]);
        let names: Vec<_> = entries.iter().map(|c| c.display_name.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Bo", "3"]);
        assert_eq!(entries[2].last_message_body, "");
        assert_eq!(entries[2].last_message_timestamp, None);
    }
}
