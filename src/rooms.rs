//! Room membership tracking.
//!
//! A room holds at most one desktop and one mobile member. The directory
//! exclusively owns member handles; connection tasks keep only the room id,
//! so a concurrent leave cannot race a relay holding a stale member borrow.
//! All mutation goes through dashmap entry guards, which serializes
//! join/leave/fan-out per room without a global lock.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, Instant},
};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::protocol::ServerEvent;

pub type ConnId = Uuid;
pub type OutboundTx = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Desktop,
    Mobile,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Desktop => write!(f, "desktop"),
            Role::Mobile => write!(f, "mobile"),
        }
    }
}

#[derive(Clone)]
pub struct Member {
    pub conn: ConnId,
    pub role: Role,
    pub tx: OutboundTx,
}

struct Room {
    desktop: Option<Member>,
    mobile: Option<Member>,
    created_at: Instant,
    /// Set when the last member leaves; the sweeper reclaims the room after
    /// the idle timeout so a brief reconnect window survives.
    empty_since: Option<Instant>,
}

impl Room {
    fn new() -> Self {
        Self {
            desktop: None,
            mobile: None,
            created_at: Instant::now(),
            empty_since: Some(Instant::now()),
        }
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<Member> {
        match role {
            Role::Desktop => &mut self.desktop,
            Role::Mobile => &mut self.mobile,
        }
    }

    fn member_count(&self) -> usize {
        self.desktop.is_some() as usize + self.mobile.is_some() as usize
    }

    fn members(&self) -> impl Iterator<Item = &Member> {
        self.desktop.iter().chain(self.mobile.iter())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("room not found")]
    RoomNotFound,
    #[error("{0} slot already occupied")]
    RoleOccupied(&'static str),
}

/// Acknowledgement of a successful join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinAck {
    /// Member count after the join, so the gateway knows whether anyone is
    /// there to notify.
    pub members: usize,
}

pub struct RoomDirectory {
    rooms: DashMap<String, Room>,
}

impl Default for RoomDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Create an empty room. Idempotent; minted when a code is issued.
    pub fn create(&self, room_id: &str) {
        self.rooms.entry(room_id.to_string()).or_insert_with(Room::new);
    }

    pub fn exists(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Add a member to a room. Rejected if the room is unknown or the role
    /// slot is taken; the two role slots are what cap the room at two members.
    pub fn join(&self, room_id: &str, member: Member) -> Result<JoinAck, RoomError> {
        let mut room = self.rooms.get_mut(room_id).ok_or(RoomError::RoomNotFound)?;
        let slot = room.slot_mut(member.role);
        if slot.is_some() {
            return Err(RoomError::RoleOccupied(match member.role {
                Role::Desktop => "desktop",
                Role::Mobile => "mobile",
            }));
        }
        *slot = Some(member);
        room.empty_since = None;
        Ok(JoinAck {
            members: room.member_count(),
        })
    }

    /// Remove a connection from a room. Returns true if it was a member.
    /// An emptied room is stamped for idle reclamation, not removed outright.
    pub fn leave(&self, room_id: &str, conn: ConnId) -> bool {
        let Some(mut entry) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let room = entry.value_mut();
        let mut removed = false;
        for slot in [&mut room.desktop, &mut room.mobile] {
            if slot.as_ref().is_some_and(|m| m.conn == conn) {
                *slot = None;
                removed = true;
            }
        }
        if removed && room.member_count() == 0 {
            room.empty_since = Some(Instant::now());
        }
        removed
    }

    /// Every live member of the room except `conn`. The relay fans out over
    /// this set difference, which stays correct if the capacity policy ever
    /// grows past two slots.
    pub fn members_except(&self, room_id: &str, conn: ConnId) -> Vec<Member> {
        match self.rooms.get(room_id) {
            Some(room) => room
                .members()
                .filter(|m| m.conn != conn)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Drop rooms that have been empty longer than `idle`. Returns how many
    /// were reclaimed.
    ///
    /// Removals are counted inside the retain pass; a length diff would race
    /// concurrent `create` calls and could underflow.
    pub fn reclaim_idle(&self, idle: Duration) -> usize {
        let reclaimed = AtomicUsize::new(0);
        self.rooms.retain(|room_id, room| {
            let keep = !room.empty_since.is_some_and(|t| t.elapsed() > idle);
            if !keep {
                debug!(
                    room = %room_id,
                    age_secs = room.created_at.elapsed().as_secs(),
                    "reclaiming idle room"
                );
                reclaimed.fetch_add(1, Ordering::Relaxed);
            }
            keep
        });
        reclaimed.into_inner()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
