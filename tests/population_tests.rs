//! Spawning and retirement tests

use junction_sim::simulation::{
    pick_weighted, ClassWeights, DelayWindow, Direction, JunctionGeometry, KinematicsParams,
    ObstructionField, ObstructionKind, PopulationManager, Position, SimVehicle, SpawnContext,
    SpawnMode, SpawnPolicy, TurnIntent, TurnWeights, VehicleClass,
};

struct Fixture {
    geometry: JunctionGeometry,
    obstructions: ObstructionField,
    params: KinematicsParams,
}

impl Fixture {
    fn new() -> Self {
        let geometry = JunctionGeometry::default();
        Self {
            geometry,
            obstructions: ObstructionField::new(geometry),
            params: KinematicsParams::default(),
        }
    }

    fn ctx<'a>(&'a self, now: f32, live: &'a [SimVehicle]) -> SpawnContext<'a> {
        SpawnContext {
            now,
            delta_secs: 0.1,
            live,
            obstructions: &self.obstructions,
            geometry: &self.geometry,
            roundabout: false,
            params: &self.params,
        }
    }
}

#[test]
fn test_pick_weighted() {
    let options = [('a', 1.0), ('b', 0.0), ('c', 3.0)];
    assert_eq!(pick_weighted(&options, 0.0), Some('a'));
    assert_eq!(pick_weighted(&options, 0.2), Some('a'));
    assert_eq!(pick_weighted(&options, 0.3), Some('c'));
    assert_eq!(pick_weighted(&options, 1.0), Some('c'));

    assert_eq!(pick_weighted(&[('a', 0.0), ('b', -1.0)], 0.5), None);
    assert_eq!(pick_weighted::<char>(&[], 0.5), None);
    assert_eq!(pick_weighted(&[('a', -2.0), ('b', 1.0)], 0.0), Some('b'));
}

#[test]
fn test_default_weights() {
    let turns = TurnWeights::default();
    assert_eq!(turns.pick(0.5), Some(TurnIntent::Straight));
    assert_eq!(turns.pick(0.7), Some(TurnIntent::Left));
    assert_eq!(turns.pick(0.9), Some(TurnIntent::Right));

    let classes = ClassWeights::default();
    assert_eq!(classes.pick(0.1), Some(VehicleClass::Car));
    assert_eq!(classes.pick(0.85), Some(VehicleClass::Bus));
    assert_eq!(classes.pick(0.95), Some(VehicleClass::Truck));
}

#[test]
fn test_spawn_interval() {
    let fixture = Fixture::new();
    let mut population = PopulationManager::new(SpawnPolicy::default(), Some(3));
    assert!(population.spawn_due(0.0, 0));

    let vehicle = population.maybe_spawn(&fixture.ctx(0.0, &[])).unwrap();
    assert_eq!(population.totals().spawned, 1);
    assert_eq!(population.last_spawn_time(), Some(0.0));
    assert_eq!(vehicle.position, vehicle.path[0]);

    assert!(!population.spawn_due(1.0, 1));
    assert!(population.maybe_spawn(&fixture.ctx(1.0, &[])).is_none());
    assert!(population.spawn_due(2.0, 1));
}

#[test]
fn test_off_mode_never_spawns_automatically() {
    let fixture = Fixture::new();
    let policy = SpawnPolicy {
        mode: SpawnMode::Off,
        ..SpawnPolicy::default()
    };
    let mut population = PopulationManager::new(policy, Some(3));
    for step in 0..100 {
        assert!(population
            .maybe_spawn(&fixture.ctx(step as f32, &[]))
            .is_none());
    }

    // Explicit requests still work
    let vehicle = population
        .spawn(
            &fixture.ctx(0.0, &[]),
            Direction::West,
            TurnIntent::Right,
            VehicleClass::Truck,
        )
        .unwrap();
    assert_eq!(vehicle.class, VehicleClass::Truck);
    assert_eq!(vehicle.entry, Direction::West);
    assert_eq!(population.totals().spawned, 1);
}

#[test]
fn test_zero_arrival_rate_blocks_spawning() {
    let fixture = Fixture::new();
    let mut population = PopulationManager::new(SpawnPolicy::default(), Some(3));
    population.set_arrival_rate(Some(0.0));
    for step in 0..50 {
        assert!(population
            .maybe_spawn(&fixture.ctx(step as f32 * 3.0, &[]))
            .is_none());
    }
    assert_eq!(population.totals().spawned, 0);
}

#[test]
fn test_active_cap() {
    let fixture = Fixture::new();
    let policy = SpawnPolicy {
        max_active: 1,
        ..SpawnPolicy::default()
    };
    let mut population = PopulationManager::new(policy, Some(3));
    let first = population
        .spawn(
            &fixture.ctx(0.0, &[]),
            Direction::North,
            TurnIntent::Straight,
            VehicleClass::Car,
        )
        .unwrap();

    let live = vec![first];
    let second = population.spawn(
        &fixture.ctx(0.0, &live),
        Direction::South,
        TurnIntent::Straight,
        VehicleClass::Car,
    );
    assert!(second.is_err());
    assert_eq!(population.totals().spawned, 1);
}

#[test]
fn test_occupied_spawn_point() {
    let fixture = Fixture::new();
    let mut population = PopulationManager::new(SpawnPolicy::default(), Some(3));
    let first = population
        .spawn(
            &fixture.ctx(0.0, &[]),
            Direction::East,
            TurnIntent::Straight,
            VehicleClass::Car,
        )
        .unwrap();

    let live = vec![first];
    assert!(population
        .spawn(
            &fixture.ctx(0.0, &live),
            Direction::East,
            TurnIntent::Left,
            VehicleClass::Car,
        )
        .is_err());
    assert!(population
        .spawn(
            &fixture.ctx(0.0, &live),
            Direction::West,
            TurnIntent::Left,
            VehicleClass::Car,
        )
        .is_ok());
}

#[test]
fn test_empty_path_is_discarded() {
    let mut fixture = Fixture::new();
    fixture.geometry.stop_line = 500.0;
    let mut population = PopulationManager::new(SpawnPolicy::default(), Some(3));

    let result = population.spawn(
        &fixture.ctx(0.0, &[]),
        Direction::North,
        TurnIntent::Straight,
        VehicleClass::Car,
    );
    assert!(result.is_err());
    assert!(population.maybe_spawn(&fixture.ctx(5.0, &[])).is_none());
    assert_eq!(population.totals().spawned, 0);
    assert_eq!(population.last_spawn_time(), None);

    // Ids were not consumed by the failed attempts
    fixture.geometry = JunctionGeometry::default();
    let vehicle = population
        .spawn(
            &fixture.ctx(6.0, &[]),
            Direction::North,
            TurnIntent::Straight,
            VehicleClass::Car,
        )
        .unwrap();
    assert_eq!(vehicle.id.0, 0);
}

#[test]
fn test_capacity_reduction_sheds_arrivals() {
    let mut fixture = Fixture::new();
    for (x, z) in [(1.75, -50.0), (-1.75, 50.0), (50.0, 1.75), (-50.0, -1.75)] {
        fixture
            .obstructions
            .place(Position::new(x, z), ObstructionKind::VendorEncroachment)
            .unwrap();
    }
    let mut population = PopulationManager::new(SpawnPolicy::default(), Some(11));

    let attempts = 400;
    let spawned = (0..attempts)
        .filter(|step| {
            population
                .maybe_spawn(&fixture.ctx(*step as f32 * 3.0, &[]))
                .is_some()
        })
        .count();
    assert!(
        spawned > 120 && spawned < 280,
        "{} of {} arrivals spawned",
        spawned,
        attempts
    );
}

#[test]
fn test_baseline_delay_is_sampled() {
    let fixture = Fixture::new();
    let policy = SpawnPolicy {
        baseline_delay: Some(DelayWindow { min: 1.0, max: 3.0 }),
        ..SpawnPolicy::default()
    };
    let mut population = PopulationManager::new(policy, Some(5));
    for step in 0..20 {
        let vehicle = population
            .maybe_spawn(&fixture.ctx(step as f32 * 3.0, &[]))
            .unwrap();
        assert!(vehicle.stop_line_delay >= 1.0 && vehicle.stop_line_delay <= 3.0);
        assert!(vehicle.hold_until.is_none());
    }
}

#[test]
fn test_retire_counts_finished_vehicles() {
    let fixture = Fixture::new();
    let mut population = PopulationManager::new(SpawnPolicy::default(), Some(3));
    let mut done = population
        .spawn(
            &fixture.ctx(0.0, &[]),
            Direction::North,
            TurnIntent::Left,
            VehicleClass::Bus,
        )
        .unwrap();
    done.path_index = done.path.len();
    done.emissions = 120.0;
    let live = population
        .spawn(
            &fixture.ctx(0.0, &[]),
            Direction::South,
            TurnIntent::Left,
            VehicleClass::Car,
        )
        .unwrap();

    let remaining = population.retire(vec![done, live.clone()]);
    assert_eq!(remaining, vec![live]);
    let totals = population.totals();
    assert_eq!(totals.spawned, 2);
    assert_eq!(totals.completed, 1);
    assert_eq!(totals.retired_emissions, 120.0);
}

#[test]
fn test_discard_keeps_emissions_and_counts_removals() {
    let fixture = Fixture::new();
    let mut population = PopulationManager::new(SpawnPolicy::default(), Some(4));
    let mut dropped = population
        .spawn(
            &fixture.ctx(0.0, &[]),
            Direction::East,
            TurnIntent::Straight,
            VehicleClass::Truck,
        )
        .unwrap();
    dropped.emissions = 300.0;

    assert_eq!(population.discard(vec![dropped]), 1);
    assert_eq!(population.discard(Vec::new()), 0);
    let totals = population.totals();
    assert_eq!(totals.spawned, 1);
    assert_eq!(totals.completed, 0);
    assert_eq!(totals.removed, 1);
    assert_eq!(totals.retired_emissions, 300.0);
}
