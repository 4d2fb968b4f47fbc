//! Full-tick benchmark: a 16 player deathmatch with hooks and gunfire.

use std::collections::BTreeMap;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use hookline::game::input::InputFrame;
use hookline::game::physics::{physics_step, PhysicsEnv};
use hookline::{Authority, GameMap, MatchConfig, Vec2};

fn busy_authority(players: usize) -> Authority {
    let map = Arc::new(GameMap::demo_arena().expect("demo arena"));
    let mut authority = Authority::new(map, MatchConfig::default(), players);
    for i in 0..players {
        authority.join(&format!("bot{i}")).expect("slot");
    }
    authority
}

fn bot_frame(sequence: u32, index: u16) -> InputFrame {
    let phase = sequence + u32::from(index) * 7;
    let dir = if (phase / 30) % 2 == 0 { 1 } else { -1 };
    InputFrame::new(sequence)
        .with_direction(dir)
        .with_aim(Vec2::new(dir as f32, -0.4))
        .with_button(InputFrame::FLAG_JUMP, phase % 45 == 0)
        .with_button(InputFrame::FLAG_HOOK, phase % 60 < 25)
        .with_button(InputFrame::FLAG_FIRE, phase % 4 == 0)
}

fn bench_tick(c: &mut Criterion) {
    c.bench_function("tick_16_players", |b| {
        let mut authority = busy_authority(16);
        let ids: Vec<_> = authority.world().character_ids();
        let mut sequence = 0u32;
        b.iter(|| {
            sequence += 1;
            for id in &ids {
                authority.apply_input(*id, bot_frame(sequence, id.0));
            }
            black_box(authority.tick());
        });
    });
}

fn bench_physics_step(c: &mut Criterion) {
    let map = GameMap::demo_arena().expect("demo arena");
    let config = MatchConfig::default();
    let env = PhysicsEnv {
        map: &map,
        tuning: &config.tuning,
        freeze_enabled: config.freeze_enabled,
    };
    let authority = busy_authority(1);
    let start = authority.world().characters().next().expect("character").clone();

    c.bench_function("physics_step_64_replay", |b| {
        b.iter(|| {
            let mut character = start.clone();
            for seq in 0..64 {
                physics_step(&mut character, &bot_frame(seq, 0), &env, config.dt());
            }
            black_box(character.position)
        });
    });
}

fn bench_snapshot_encode(c: &mut Criterion) {
    let mut authority = busy_authority(16);
    let inputs: BTreeMap<_, _> = authority
        .world()
        .character_ids()
        .into_iter()
        .map(|id| (id, bot_frame(1, id.0)))
        .collect();
    for (id, frame) in inputs {
        authority.apply_input(id, frame);
    }
    authority.tick();
    let snapshot = authority.snapshot();

    c.bench_function("snapshot_bincode", |b| {
        b.iter(|| black_box(bincode::serialize(&*snapshot).expect("encode")))
    });
    c.bench_function("snapshot_json", |b| {
        b.iter(|| black_box(serde_json::to_string(&*snapshot).expect("encode")))
    });
}

criterion_group!(benches, bench_tick, bench_physics_step, bench_snapshot_encode);
criterion_main!(benches);
