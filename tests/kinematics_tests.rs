//! Vehicle kinematics tests
//!
//! These drive `SimVehicle::advance` directly against a hand-built context.

use junction_sim::simulation::{
    generate_path, AdvanceContext, Direction, JunctionGeometry, KinematicsParams,
    ObstructionField, ObstructionKind, Position, SignalController, SignalPhase, SimVehicle,
    TurnIntent, VehicleClass, VehicleId, STOP_LINE_INDEX,
};

const DT: f32 = 1.0 / 60.0;

fn vehicle(id: usize, class: VehicleClass, entry: Direction, turn: TurnIntent) -> SimVehicle {
    SimVehicle::new(
        VehicleId(id),
        class,
        entry,
        turn,
        generate_path(entry, turn, false),
        0.0,
    )
    .unwrap()
}

/// Drive a lone vehicle for `seconds`, returning the final state
fn drive(
    vehicle: SimVehicle,
    seconds: f32,
    signal: Option<&SignalController>,
    obstructions: &ObstructionField,
) -> SimVehicle {
    drive_tracking_braking(vehicle, seconds, signal, obstructions).0
}

/// Like `drive`, also returning the largest speed drop over a single tick
fn drive_tracking_braking(
    mut vehicle: SimVehicle,
    seconds: f32,
    signal: Option<&SignalController>,
    obstructions: &ObstructionField,
) -> (SimVehicle, f32) {
    let params = KinematicsParams::default();
    let ticks = (seconds / DT).round() as usize;
    let mut largest_drop = 0.0f32;
    for tick in 0..ticks {
        let ctx = AdvanceContext {
            now: (tick + 1) as f32 * DT,
            signal,
            obstructions,
            neighbors: &[],
            params: &params,
        };
        let next = vehicle.advance(DT, &ctx);
        largest_drop = largest_drop.max(vehicle.speed - next.speed);
        vehicle = next;
    }
    (vehicle, largest_drop)
}

fn empty_field() -> ObstructionField {
    ObstructionField::new(JunctionGeometry::default())
}

/// A controller showing red to the north-south group
fn east_west_green() -> SignalController {
    let mut signal = SignalController::default();
    while signal.phase() != SignalPhase::EwGreen {
        signal.tick(100.0);
    }
    signal
}

#[test]
fn test_new_vehicle_starts_at_spawn() {
    let v = vehicle(0, VehicleClass::Car, Direction::South, TurnIntent::Straight);
    assert_eq!(v.position, v.path[0]);
    assert_eq!(v.path_index, 1);
    assert_eq!(v.speed, 0.0);
    assert!(!v.is_terminal());
    // Heading north
    assert!(v.heading.abs() < 1e-5);
    assert_eq!(v.distance_to_stop_line(), Some(85.0));

    assert!(SimVehicle::new(
        VehicleId(1),
        VehicleClass::Car,
        Direction::South,
        TurnIntent::Straight,
        vec![Position::ORIGIN],
        0.0,
    )
    .is_none());
}

#[test]
fn test_speed_bounded_and_path_monotonic() {
    let field = empty_field();
    let params = KinematicsParams::default();
    for class in VehicleClass::ALL {
        for turn in TurnIntent::ALL {
            let mut v = vehicle(0, class, Direction::East, turn);
            let max_speed = class.performance().max_speed;
            for tick in 0..3000 {
                let ctx = AdvanceContext {
                    now: tick as f32 * DT,
                    signal: None,
                    obstructions: &field,
                    neighbors: &[],
                    params: &params,
                };
                let next = v.advance(DT, &ctx);
                assert!(next.speed >= 0.0 && next.speed <= max_speed);
                assert!(next.path_index >= v.path_index);
                assert!(next.path_index <= next.path.len());
                v = next;
            }
            assert!(v.is_terminal(), "{} going {} never finished", class, turn);
        }
    }
}

#[test]
fn test_terminal_vehicle_does_not_move() {
    let mut v = vehicle(0, VehicleClass::Car, Direction::North, TurnIntent::Straight);
    v.path_index = v.path.len();
    let after = drive(v.clone(), 1.0, None, &empty_field());
    assert_eq!(after, v);
}

#[test]
fn test_barricade_holds_vehicle_in_place() {
    let mut field = empty_field();
    let v = vehicle(0, VehicleClass::Bus, Direction::West, TurnIntent::Straight);
    field
        .place(v.position + Position::new(3.0, 0.0), ObstructionKind::Barricade)
        .unwrap();

    let after = drive(v.clone(), 5.0, None, &field);
    assert_eq!(after.speed, 0.0);
    assert_eq!(after.position, v.position);
    assert!(after.is_waiting);
    assert!((after.wait_time - 5.0).abs() < 1e-2);
    assert!(after.emissions > 0.0);
}

#[test]
fn test_pothole_caps_speed() {
    let mut field = empty_field();
    let v = vehicle(0, VehicleClass::Car, Direction::South, TurnIntent::Straight);
    // Long enough to cover the whole southern approach
    field
        .place_with_length(Position::new(1.75, -60.0), ObstructionKind::Pothole, 100.0)
        .unwrap();

    let cap = 0.5 * VehicleClass::Car.performance().max_speed;
    let params = KinematicsParams::default();
    let mut v = v;
    for tick in 0..300 {
        let ctx = AdvanceContext {
            now: tick as f32 * DT,
            signal: None,
            obstructions: &field,
            neighbors: &[],
            params: &params,
        };
        v = v.advance(DT, &ctx);
        assert!(v.speed <= cap + 1e-4);
    }
    assert!(v.speed > 0.9 * cap);
}

#[test]
fn test_barricade_ahead_stops_vehicle_short_of_zone() {
    let mut field = empty_field();
    let mut v = vehicle(0, VehicleClass::Car, Direction::South, TurnIntent::Straight);
    v.speed = v.performance().max_speed;
    v.target_speed = v.speed;
    // Zone edge 27 units ahead, well past the car's stopping distance
    let barricade = field
        .place_with_length(Position::new(1.75, -70.0), ObstructionKind::Barricade, 6.0)
        .unwrap();

    let (stopped, largest_drop) = drive_tracking_braking(v, 6.0, None, &field);
    assert_eq!(stopped.speed, 0.0);
    assert!(!barricade.contains(stopped.position));
    assert!(stopped.position.z < -73.0 && stopped.position.z > -74.0);
    let deceleration = VehicleClass::Car.performance().deceleration;
    assert!(largest_drop <= 2.0 * deceleration * DT + 1e-3);

    let still = drive(stopped.clone(), 5.0, None, &field);
    assert_eq!(still.speed, 0.0);
    assert_eq!(still.position, stopped.position);
    assert!(still.is_waiting);

    let mut cleared = field.clone();
    cleared.remove(barricade.id);
    let released = drive(still, 3.0, None, &cleared);
    assert!(released.position.z > -70.0);
}

#[test]
fn test_red_signal_holds_at_stop_line() {
    let signal = east_west_green();
    let field = empty_field();
    let mut v = vehicle(0, VehicleClass::Car, Direction::South, TurnIntent::Straight);
    let stop_line = v.path[STOP_LINE_INDEX];
    v.position = stop_line - Position::new(0.0, 25.0);
    v.speed = v.performance().max_speed;
    v.target_speed = v.speed;

    let (held, largest_drop) = drive_tracking_braking(v, 10.0, Some(&signal), &field);
    assert_eq!(held.speed, 0.0);
    assert_eq!(held.path_index, STOP_LINE_INDEX);
    assert!(held.position.z < stop_line.z);
    let gap = held.position.distance(&stop_line);
    assert!((1.0..1.2).contains(&gap), "stopped {} short of the line", gap);
    assert!(held.is_waiting);
    // Braked at the class rate rather than stopping dead
    let deceleration = VehicleClass::Car.performance().deceleration;
    assert!(largest_drop <= 2.0 * deceleration * DT + 1e-3);

    // Same signal, but now green for this approach
    let green = SignalController::default();
    let released = drive(held, 3.0, Some(&green), &field);
    assert!(released.path_index > STOP_LINE_INDEX);
    assert!(!released.is_waiting);
}

#[test]
fn test_vehicle_unable_to_stop_clears_the_line() {
    // Just turned yellow for the north-south group
    let mut signal = SignalController::default();
    signal.tick(30.0);
    assert_eq!(signal.phase(), SignalPhase::NsYellow);

    let field = empty_field();
    let mut v = vehicle(0, VehicleClass::Car, Direction::South, TurnIntent::Straight);
    let stop_line = v.path[STOP_LINE_INDEX];
    v.position = stop_line - Position::new(0.0, 4.0);
    v.speed = v.performance().max_speed;
    v.target_speed = v.speed;

    let (after, largest_drop) = drive_tracking_braking(v, 1.0, Some(&signal), &field);
    assert!(after.path_index > STOP_LINE_INDEX);
    assert!(after.position.z > stop_line.z);
    assert!(largest_drop < 1e-4);
}

#[test]
fn test_signal_ignored_beyond_lookahead() {
    let signal = east_west_green();
    let v = vehicle(0, VehicleClass::Car, Direction::South, TurnIntent::Straight);
    let after = drive(v, 2.0, Some(&signal), &empty_field());
    assert!(after.speed > 3.0);
}

#[test]
fn test_baseline_delay_holds_then_releases() {
    let field = empty_field();
    let mut v = vehicle(0, VehicleClass::Car, Direction::North, TurnIntent::Straight);
    let stop_line = v.path[STOP_LINE_INDEX];
    v.position = stop_line + Position::new(0.0, 1.5);
    v.stop_line_delay = 2.0;

    let held = drive(v, 1.5, None, &field);
    assert_eq!(held.path_index, STOP_LINE_INDEX);
    assert_eq!(held.speed, 0.0);
    assert!(held.hold_until.is_some());

    let released = drive(held, 4.0, None, &field);
    assert!(released.path_index > STOP_LINE_INDEX);
}

#[test]
fn test_wait_time_decays_while_moving() {
    let field = empty_field();
    let params = KinematicsParams::default();
    let mut v = vehicle(0, VehicleClass::Car, Direction::South, TurnIntent::Straight);
    v.speed = v.performance().max_speed;
    v.target_speed = v.speed;
    v.wait_time = 10.0;

    let ctx = AdvanceContext {
        now: 0.1,
        signal: None,
        obstructions: &field,
        neighbors: &[],
        params: &params,
    };
    let next = v.advance(0.1, &ctx);
    let expected = 10.0 * (-0.1f32 / params.wait_decay_tau).exp();
    assert!((next.wait_time - expected).abs() < 1e-4);
    assert_eq!(next.stopped_for, 0.0);
}

#[test]
fn test_waiting_needs_sustained_stop() {
    let mut field = empty_field();
    let v = vehicle(0, VehicleClass::Car, Direction::East, TurnIntent::Left);
    field.place(v.position, ObstructionKind::Barricade).unwrap();

    let brief = drive(v.clone(), 0.25, None, &field);
    assert!(!brief.is_waiting);
    let long = drive(v, 1.0, None, &field);
    assert!(long.is_waiting);
}

#[test]
fn test_follower_stops_behind_close_leader() {
    let field = empty_field();
    let params = KinematicsParams::default();
    let follower = vehicle(0, VehicleClass::Car, Direction::South, TurnIntent::Straight);
    let mut leader = vehicle(1, VehicleClass::Car, Direction::South, TurnIntent::Straight);
    leader.position = follower.position + Position::new(0.0, 5.0);

    let neighbors = vec![follower.clone(), leader];
    let mut v = follower;
    for tick in 0..120 {
        let ctx = AdvanceContext {
            now: tick as f32 * DT,
            signal: None,
            obstructions: &field,
            neighbors: &neighbors,
            params: &params,
        };
        v = v.advance(DT, &ctx);
    }
    assert_eq!(v.speed, 0.0);
}

#[test]
fn test_follower_ignores_vehicle_behind_or_opposing() {
    let field = empty_field();
    let params = KinematicsParams::default();
    let follower = vehicle(0, VehicleClass::Car, Direction::South, TurnIntent::Straight);

    let mut behind = vehicle(1, VehicleClass::Car, Direction::South, TurnIntent::Straight);
    behind.position = follower.position - Position::new(0.0, 5.0);
    let mut opposing = vehicle(2, VehicleClass::Car, Direction::North, TurnIntent::Straight);
    opposing.position = follower.position + Position::new(0.0, 5.0);

    let neighbors = vec![behind, opposing];
    let mut v = follower;
    for tick in 0..60 {
        let ctx = AdvanceContext {
            now: tick as f32 * DT,
            signal: None,
            obstructions: &field,
            neighbors: &neighbors,
            params: &params,
        };
        v = v.advance(DT, &ctx);
    }
    assert!(v.speed > 1.0);
}

#[test]
fn test_following_can_be_disabled() {
    let field = empty_field();
    let params = KinematicsParams {
        following: false,
        ..KinematicsParams::default()
    };
    let follower = vehicle(0, VehicleClass::Car, Direction::South, TurnIntent::Straight);
    let mut leader = vehicle(1, VehicleClass::Car, Direction::South, TurnIntent::Straight);
    leader.position = follower.position + Position::new(0.0, 5.0);

    let neighbors = vec![leader];
    let mut v = follower;
    for tick in 0..60 {
        let ctx = AdvanceContext {
            now: tick as f32 * DT,
            signal: None,
            obstructions: &field,
            neighbors: &neighbors,
            params: &params,
        };
        v = v.advance(DT, &ctx);
    }
    assert!(v.speed > 1.0);
}
