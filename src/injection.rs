//! Synthetic packets sent to a game client to reconcile what it sees
//! with the world of a new backend.
//!
//! Each injection is a single send on the client link; injections made of
//! several packets go out as one batch.

use crate::{
    connection::Connection,
    entity_id::EntityId,
    position::{BlockPosition, Vec3},
    protocol::packet::{server, side},
};
use std::ops::RangeInclusive;
use uuid::Uuid;

pub type Upstream = Connection<side::Server>;

/// Effect IDs a client may still show after leaving a backend.
const EFFECT_IDS: RangeInclusive<i32> = 1..=30;

/// Dimensions every client knows about.
const DIMENSIONS: RangeInclusive<i32> = 0..=2;

pub fn remove_all_players<'a>(upstream: &Upstream, players: impl IntoIterator<Item = &'a Uuid>) {
    let uuids: Vec<Uuid> = players.into_iter().copied().collect();
    if uuids.is_empty() {
        return;
    }
    upstream.send_packet(server::PlayerList::Remove { uuids });
}

pub fn remove_entity(upstream: &Upstream, unique_entity_id: i64) {
    upstream.send_packet(server::RemoveEntity { unique_entity_id });
}

pub fn remove_objective(upstream: &Upstream, objective_name: &str) {
    upstream.send_packet(server::RemoveObjective {
        objective_name: objective_name.to_owned(),
    });
}

pub fn remove_boss_bar(upstream: &Upstream, boss_entity_id: i64) {
    upstream.send_packet(server::BossEvent {
        boss_entity_id,
        event_type: server::BossEvent::HIDE,
        ignored_data: Vec::new(),
    });
}

/// Clears every status effect from the player's own entity.
pub fn remove_all_effects(upstream: &Upstream, entity_id: EntityId) {
    let packets: Vec<server::Packet> = EFFECT_IDS
        .map(|effect_id| {
            server::MobEffect {
                runtime_entity_id: entity_id.runtime(),
                event: server::MobEffect::EVENT_REMOVE,
                effect_id,
                amplifier: 0,
                show_particles: false,
                duration: 0,
            }
            .into()
        })
        .collect();
    upstream.send_batch(packets);
}

pub fn game_mode(upstream: &Upstream, game_type: i32) {
    upstream.send_packet(server::SetPlayerGameType { game_type });
}

pub fn clear_weather(upstream: &Upstream) {
    let stop = |event_id: i32| -> server::Packet {
        server::LevelEvent {
            event_id,
            position: Vec3::default(),
            data: 0,
        }
        .into()
    };
    upstream.send_batch(vec![
        stop(server::LevelEvent::STOP_RAIN),
        stop(server::LevelEvent::STOP_THUNDER),
    ]);
}

pub fn game_rules(upstream: &Upstream, game_rules: &[server::GameRule]) {
    upstream.send_packet(server::GameRulesChanged {
        game_rules: game_rules.to_vec(),
    });
}

pub fn set_difficulty(upstream: &Upstream, difficulty: i32) {
    upstream.send_packet(server::SetDifficulty {
        difficulty: clamp_difficulty(difficulty),
    });
}

/// Difficulties run from peaceful (0) to hard (3).
fn clamp_difficulty(difficulty: i32) -> u32 {
    let clamped = difficulty.clamp(0, 3);
    if clamped != difficulty {
        tracing::warn!("Backend sent difficulty {difficulty}, using {clamped}");
    }
    clamped as u32
}

/// Moves the client into `dimension`, with chunks published around
/// `position` so the terrain loads as soon as the change finishes.
pub fn dimension_change(upstream: &Upstream, dimension: i32, position: Vec3, chunk_radius: i32) {
    upstream.send_batch(vec![
        server::ChangeDimension {
            dimension,
            position,
            respawn: false,
        }
        .into(),
        server::NetworkChunkPublisherUpdate {
            position: BlockPosition::from(position),
            radius: u32::try_from(chunk_radius.saturating_mul(16)).unwrap_or_default(),
        }
        .into(),
    ]);
}

/// Picks the transient dimension for the first of two dimension changes.
///
/// Clients ignore a change into the dimension they are in, so the transient
/// one differs from both where the client is and where it is headed.
pub fn determine_dimension_id(current: i32, target: i32) -> i32 {
    DIMENSIONS
        .clone()
        .find(|&dimension| dimension != current && dimension != target)
        .unwrap_or(*DIMENSIONS.end())
}
