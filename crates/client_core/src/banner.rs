use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use shared::domain::BannerKind;
use tokio::task::JoinHandle;

pub const ERROR_BANNER_TTL: Duration = Duration::from_secs(5);
pub const SUCCESS_BANNER_TTL: Duration = Duration::from_secs(3);

pub fn banner_ttl(kind: BannerKind) -> Duration {
    match kind {
        BannerKind::Error => ERROR_BANNER_TTL,
        BannerKind::Success => SUCCESS_BANNER_TTL,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub kind: BannerKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Banner {
    pub fn new(kind: BannerKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

struct BannerSlot {
    banner: Banner,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// One slot per banner kind. Every raise gets a fresh generation so a timer
/// scheduled for a replaced banner cannot clear its successor.
#[derive(Default)]
pub(crate) struct BannerBoard {
    slots: HashMap<BannerKind, BannerSlot>,
    next_generation: u64,
}

impl BannerBoard {
    /// Stores `banner`, cancelling the dismissal timer of the banner it replaces.
    pub fn raise(&mut self, banner: Banner) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        let kind = banner.kind;
        if let Some(previous) = self.slots.insert(
            kind,
            BannerSlot {
                banner,
                generation,
                timer: None,
            },
        ) {
            abort_timer(previous);
        }
        generation
    }

    pub fn attach_timer(&mut self, kind: BannerKind, generation: u64, timer: JoinHandle<()>) {
        match self.slots.get_mut(&kind) {
            Some(slot) if slot.generation == generation => slot.timer = Some(timer),
            _ => timer.abort(),
        }
    }

    /// Timer expiry: clears the slot only if it still holds `generation`.
    pub fn expire(&mut self, kind: BannerKind, generation: u64) -> bool {
        match self.slots.get(&kind) {
            Some(slot) if slot.generation == generation => {
                self.slots.remove(&kind);
                true
            }
            _ => false,
        }
    }

    pub fn dismiss(&mut self, kind: BannerKind) -> bool {
        match self.slots.remove(&kind) {
            Some(slot) => {
                abort_timer(slot);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, kind: BannerKind) -> Option<&Banner> {
        self.slots.get(&kind).map(|slot| &slot.banner)
    }

    pub fn clear_all(&mut self) {
        for (_, slot) in self.slots.drain() {
            abort_timer(slot);
        }
    }
}

fn abort_timer(slot: BannerSlot) {
    if let Some(timer) = slot.timer {
        timer.abort();
    }
}
