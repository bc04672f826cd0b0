use std::sync::{Arc, Mutex};

use solana_sdk::signature::Signature;
use tokio::sync::watch;

use crate::error::Error;

/// Ordered, single-assignment signature slots for one submission. Slot 0 is
/// the initial broadcast; each fee bump fills the next slot. `wait` suspends
/// until the slot is set and returns the same value on every later call.
#[derive(Clone, Default)]
pub(crate) struct SignatureList {
    slots: Arc<Mutex<Vec<watch::Sender<Option<Signature>>>>>,
}

impl SignatureList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an empty slot and return its index.
    pub fn allocate(&self) -> usize {
        let mut slots = self.slots.lock().expect("slots lock poisoned");
        let (tx, _rx) = watch::channel(None);
        slots.push(tx);
        slots.len() - 1
    }

    /// Fill a slot exactly once. A second set on the same slot is an error.
    pub fn set(&self, index: usize, sig: Signature) -> Result<(), Error> {
        let slots = self.slots.lock().expect("slots lock poisoned");
        let slot = slots.get(index).ok_or(Error::SlotOutOfRange(index))?;
        let mut already_set = false;
        slot.send_modify(|value| {
            if value.is_some() {
                already_set = true;
            } else {
                *value = Some(sig);
            }
        });
        if already_set {
            return Err(Error::SlotAlreadySet(index));
        }
        Ok(())
    }

    /// Suspend until the slot is set, then return its value.
    pub async fn wait(&self, index: usize) -> Result<Signature, Error> {
        let mut rx = {
            let slots = self.slots.lock().expect("slots lock poisoned");
            slots
                .get(index)
                .ok_or(Error::SlotOutOfRange(index))?
                .subscribe()
        };
        let value = rx
            .wait_for(|value| value.is_some())
            .await
            .map_err(|_| Error::SlotUnset(index))?;
        value.ok_or(Error::SlotUnset(index))
    }

    /// Return the slot value, or an error if it has not been set.
    pub fn get(&self, index: usize) -> Result<Signature, Error> {
        let slots = self.slots.lock().expect("slots lock poisoned");
        let slot = slots.get(index).ok_or(Error::SlotOutOfRange(index))?;
        let value = *slot.borrow();
        value.ok_or(Error::SlotUnset(index))
    }

    /// Snapshot of the slots that have been set, in slot order.
    pub fn list(&self) -> Vec<Signature> {
        let slots = self.slots.lock().expect("slots lock poisoned");
        slots.iter().filter_map(|slot| *slot.borrow()).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn sig(byte: u8) -> Signature {
        Signature::from([byte; 64])
    }

    #[test]
    fn test_allocate_set_get() {
        let sigs = SignatureList::new();
        assert_eq!(sigs.allocate(), 0);
        assert_eq!(sigs.allocate(), 1);

        sigs.set(0, sig(1)).unwrap();
        assert_eq!(sigs.get(0).unwrap(), sig(1));
        assert!(matches!(sigs.get(1), Err(Error::SlotUnset(1))));
        assert!(matches!(sigs.get(5), Err(Error::SlotOutOfRange(5))));
        assert_eq!(sigs.list(), vec![sig(1)]);

        sigs.set(1, sig(2)).unwrap();
        assert_eq!(sigs.list(), vec![sig(1), sig(2)]);
    }

    #[test]
    fn test_second_set_is_rejected() {
        let sigs = SignatureList::new();
        sigs.allocate();
        sigs.set(0, sig(1)).unwrap();
        assert!(matches!(sigs.set(0, sig(2)), Err(Error::SlotAlreadySet(0))));
        // first value wins
        assert_eq!(sigs.get(0).unwrap(), sig(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_suspends_until_set() {
        let sigs = SignatureList::new();
        sigs.allocate();

        let waiter = sigs.clone();
        let handle = tokio::spawn(async move { waiter.wait(0).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());

        sigs.set(0, sig(9)).unwrap();
        assert_eq!(handle.await.unwrap().unwrap(), sig(9));

        // set already ran, wait returns immediately with the same value
        assert_eq!(sigs.wait(0).await.unwrap(), sig(9));
    }
}
