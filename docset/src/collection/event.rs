use super::change::ChangeRecord;
use crate::common::{DEFAULT_MAX_LISTENERS, NEW_LISTENER_EVENT, REMOVE_LISTENER_EVENT};
use crate::errors::{DocsetError, DocsetResult, ErrorKind};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Payload delivered to collection listeners.
#[derive(Clone, Debug)]
pub enum CollectionEvent {
    /// A completed change batch, in emission order.
    Change(Vec<ChangeRecord>),
    /// A listener was registered for the named event.
    NewListener(String),
    /// A listener was removed from the named event.
    RemoveListener(String),
}

/// A collection listener callback.
pub type ListenerFn = Arc<dyn Fn(&CollectionEvent) -> DocsetResult<()> + Send + Sync>;

/// Token identifying a registered listener; closures are not comparable, so
/// `off` removes by token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ListenerId(u64);

struct RegisteredListener {
    id: ListenerId,
    callback: ListenerFn,
    once: bool,
}

/// Per-collection listener registry.
///
/// Listeners dispatch synchronously, in registration order, over a snapshot
/// of the list taken when dispatch starts; a listener mutating the registry
/// mid-dispatch does not affect the current pass. Every listener runs even
/// if earlier ones fail, and all failures are raised afterwards as one
/// aggregate [ErrorKind::EventError].
pub struct EventEmitter {
    listeners: RwLock<IndexMap<String, Vec<RegisteredListener>>>,
    next_id: AtomicU64,
    max_listeners: AtomicUsize,
}

impl EventEmitter {
    pub fn new() -> Self {
        EventEmitter {
            listeners: RwLock::new(IndexMap::new()),
            next_id: AtomicU64::new(1),
            max_listeners: AtomicUsize::new(DEFAULT_MAX_LISTENERS),
        }
    }

    /// Sets the soft cap on listeners per event; exceeding it only logs a
    /// warning. Zero disables the check.
    pub fn set_max_listeners(&self, count: usize) {
        self.max_listeners.store(count, Ordering::Relaxed);
    }

    /// Registers a listener; returns its removal token.
    pub fn on(&self, event: &str, callback: ListenerFn) -> DocsetResult<ListenerId> {
        self.register(event, callback, false)
    }

    /// Registers a listener that is removed after its first dispatch.
    pub fn once(&self, event: &str, callback: ListenerFn) -> DocsetResult<ListenerId> {
        self.register(event, callback, true)
    }

    fn register(&self, event: &str, callback: ListenerFn, once: bool) -> DocsetResult<ListenerId> {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        // A newListener subscription is added only after the meta-event has
        // fired, so it never observes its own registration.
        let postponed = event == NEW_LISTENER_EVENT;
        if !postponed {
            self.push_listener(event, RegisteredListener { id, callback: callback.clone(), once });
        }
        if self.listener_count(NEW_LISTENER_EVENT) > 0 {
            self.emit(
                NEW_LISTENER_EVENT,
                &CollectionEvent::NewListener(event.to_string()),
            )?;
        }
        if postponed {
            self.push_listener(event, RegisteredListener { id, callback, once });
        }
        Ok(id)
    }

    fn push_listener(&self, event: &str, listener: RegisteredListener) {
        let count = {
            let mut listeners = self.listeners.write();
            let list = listeners.entry(event.to_string()).or_default();
            list.push(listener);
            list.len()
        };
        let max = self.max_listeners.load(Ordering::Relaxed);
        if max > 0 && count == max {
            log::warn!(
                "More than {} listeners added for event '{}' on collection",
                max,
                event
            );
        }
    }

    /// Removes a listener; returns whether it was registered.
    pub fn off(&self, event: &str, id: ListenerId) -> DocsetResult<bool> {
        let removed = {
            let mut listeners = self.listeners.write();
            match listeners.get_mut(event) {
                Some(list) => {
                    let before = list.len();
                    list.retain(|listener| listener.id != id);
                    list.len() != before
                }
                None => false,
            }
        };
        if removed && self.listener_count(REMOVE_LISTENER_EVENT) > 0 {
            self.emit(
                REMOVE_LISTENER_EVENT,
                &CollectionEvent::RemoveListener(event.to_string()),
            )?;
        }
        Ok(removed)
    }

    /// Removes every listener for the event.
    pub fn remove_all(&self, event: &str) -> DocsetResult<()> {
        let ids: Vec<ListenerId> = {
            let listeners = self.listeners.read();
            listeners
                .get(event)
                .map(|list| list.iter().map(|listener| listener.id).collect())
                .unwrap_or_default()
        };
        for id in ids {
            self.off(event, id)?;
        }
        Ok(())
    }

    /// The number of listeners currently registered for the event.
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .read()
            .get(event)
            .map(|list| list.len())
            .unwrap_or(0)
    }

    /// Dispatches the payload to every listener of the event.
    pub fn emit(&self, event: &str, payload: &CollectionEvent) -> DocsetResult<()> {
        let snapshot: Vec<ListenerFn> = {
            let mut listeners = self.listeners.write();
            match listeners.get_mut(event) {
                None => return Ok(()),
                Some(list) => {
                    let snapshot = list
                        .iter()
                        .map(|listener| listener.callback.clone())
                        .collect();
                    // once-listeners are spent when dispatch starts, so a
                    // re-entrant emit cannot fire them twice
                    list.retain(|listener| !listener.once);
                    snapshot
                }
            }
        };
        let mut errors = Vec::new();
        for callback in &snapshot {
            if let Err(error) = callback(payload) {
                log::error!("Listener for '{}' failed: {}", event, error);
                errors.push(error);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DocsetError::aggregate(
                &format!("While handling '{}'", event),
                ErrorKind::EventError,
                errors,
            ))
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        EventEmitter::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> ListenerFn) {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let capture = {
            let seen = seen.clone();
            move |tag: &str| {
                let seen = seen.clone();
                let tag = tag.to_string();
                let listener: ListenerFn = Arc::new(move |_| {
                    seen.lock().push(tag.clone());
                    Ok(())
                });
                listener
            }
        };
        (seen, capture)
    }

    #[test]
    fn dispatches_in_registration_order() {
        let emitter = EventEmitter::new();
        let (seen, capture) = recorder();
        emitter.on("change", capture("first")).unwrap();
        emitter.on("change", capture("second")).unwrap();
        emitter.emit("change", &CollectionEvent::Change(vec![])).unwrap();
        assert_eq!(seen.lock().as_slice(), &["first", "second"]);
    }

    #[test]
    fn once_fires_exactly_once() {
        let emitter = EventEmitter::new();
        let (seen, capture) = recorder();
        emitter.once("change", capture("only")).unwrap();
        emitter.emit("change", &CollectionEvent::Change(vec![])).unwrap();
        emitter.emit("change", &CollectionEvent::Change(vec![])).unwrap();
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(emitter.listener_count("change"), 0);
    }

    #[test]
    fn off_removes_by_token() {
        let emitter = EventEmitter::new();
        let (seen, capture) = recorder();
        let id = emitter.on("change", capture("gone")).unwrap();
        assert!(emitter.off("change", id).unwrap());
        assert!(!emitter.off("change", id).unwrap());
        emitter.emit("change", &CollectionEvent::Change(vec![])).unwrap();
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn all_listeners_run_and_errors_aggregate() {
        let emitter = EventEmitter::new();
        let (seen, capture) = recorder();
        emitter
            .on(
                "change",
                Arc::new(|_| Err(DocsetError::new("first boom", ErrorKind::InternalError))),
            )
            .unwrap();
        emitter.on("change", capture("ran anyway")).unwrap();
        emitter
            .on(
                "change",
                Arc::new(|_| Err(DocsetError::new("second boom", ErrorKind::InternalError))),
            )
            .unwrap();
        let error = emitter
            .emit("change", &CollectionEvent::Change(vec![]))
            .unwrap_err();
        assert_eq!(error.kind(), &ErrorKind::EventError);
        assert_eq!(error.related().len(), 2);
        assert_eq!(seen.lock().as_slice(), &["ran anyway"]);
    }

    #[test]
    fn meta_events_fire_for_registration_and_removal() {
        let emitter = EventEmitter::new();
        let (seen, _) = recorder();
        let meta = {
            let seen = seen.clone();
            let listener: ListenerFn = Arc::new(move |event| {
                match event {
                    CollectionEvent::NewListener(name) => seen.lock().push(format!("+{}", name)),
                    CollectionEvent::RemoveListener(name) => {
                        seen.lock().push(format!("-{}", name))
                    }
                    _ => {}
                }
                Ok(())
            });
            listener
        };
        emitter.on(NEW_LISTENER_EVENT, meta.clone()).unwrap();
        emitter.on(REMOVE_LISTENER_EVENT, meta).unwrap();
        let id = emitter.on("change", Arc::new(|_| Ok(()))).unwrap();
        emitter.off("change", id).unwrap();
        assert_eq!(
            seen.lock().as_slice(),
            &["+removeListener", "+change", "-change"]
        );
    }

    #[test]
    fn listener_mutating_registry_does_not_affect_current_pass() {
        let emitter = Arc::new(EventEmitter::new());
        let (seen, capture) = recorder();
        let second = capture("second");
        let emitter_clone = emitter.clone();
        let registering: ListenerFn = Arc::new(move |_| {
            emitter_clone.on("change", second.clone()).map(|_| ())
        });
        emitter.on("change", registering).unwrap();
        emitter.emit("change", &CollectionEvent::Change(vec![])).unwrap();
        // the listener added mid-dispatch runs only on the next pass
        assert!(seen.lock().is_empty());
        emitter.emit("change", &CollectionEvent::Change(vec![])).unwrap();
        assert_eq!(seen.lock().len(), 1);
    }
}
