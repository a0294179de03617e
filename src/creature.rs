use std::f32::consts::{FRAC_PI_2, TAU};

use nalgebra::{point, Point2};
use rapier2d::prelude::{
    FixedJointBuilder, ImpulseJointHandle, MotorModel, RevoluteJointBuilder, RigidBodyHandle,
};

use crate::config::{
    BodyPlan, ControlConfig, CreatureType, FitnessConfig, SimulationConfig, BODY_FRICTION,
    FOOT_FRICTION, FOOT_HEIGHT, FOOT_MASS, FOOT_WIDTH, MOTOR_MAX_FORCE, SHIN_LENGTH, SHIN_MASS,
    SHIN_WIDTH, THIGH_LENGTH, THIGH_MASS, THIGH_WIDTH,
};
use crate::error::ConfigError;
use crate::genome::Genome;
use crate::physics::{World, GROUND_Y};

/// One leg chain: thigh and shin behind motor-bearing hinges, foot rigidly
/// fixed to the shin at the ankle.
#[derive(Debug)]
struct Leg {
    thigh: RigidBodyHandle,
    shin: RigidBodyHandle,
    foot: RigidBodyHandle,
    hip: ImpulseJointHandle,
    knee: ImpulseJointHandle,
}

/// An embodied genome: one creature in its own physics world, plus the
/// accumulators that shape its fitness and decide its death.
///
/// Motor indexing: motor `2*l` is leg `l`'s hip, motor `2*l + 1` its knee.
/// Biped legs are ordered left, right; quadruped legs back-left, back-right,
/// front-left, front-right.
#[derive(Debug)]
pub struct Creature {
    id: usize,
    creature_type: CreatureType,
    plan: BodyPlan,
    genome: Genome,
    world: World,
    torso: RigidBodyHandle,
    legs: Vec<Leg>,
    start_x: f32,
    prev_x: f32,

    alive: bool,
    fell: bool,
    time_alive: f32,
    frames: u32,
    height_sum: f32,
    stability_sum: f32,
    upright_distance: f32,
    energy_sum: f32,
    upright_frames: u32,
    steps: u32,
    /// Last recorded foot-offset sign per foot pair; `None` until the offset
    /// first exceeds the minimum threshold.
    last_step_sign: Vec<Option<i8>>,
    fitness: f32,
}

impl Creature {
    /// Build the constraint graph for `creature_type` at `(start_x, start_y)`
    /// (torso bottom) in a fresh world. Rejects a genome whose length does
    /// not match the profile's motor count.
    pub fn new(
        creature_type: CreatureType,
        start_x: f32,
        start_y: f32,
        genome: Genome,
        id: usize,
        sim: &SimulationConfig,
    ) -> Result<Self, ConfigError> {
        let motor_count = creature_type.motor_count();
        if genome.motor_count() != motor_count {
            return Err(ConfigError::GenomeLength {
                actual: genome.len(),
                expected: motor_count * crate::genome::GENES_PER_MOTOR,
                motor_count,
            });
        }

        let plan = creature_type.plan();
        let mut world = World::new(sim.gravity_y);
        world.add_ground(sim.ground_friction);

        let torso_y = start_y + plan.torso_height / 2.0;
        let torso = world.add_box_body(
            start_x,
            torso_y,
            plan.torso_width,
            plan.torso_height,
            plan.torso_mass,
            BODY_FRICTION,
        );

        let mut legs = Vec::with_capacity(creature_type.leg_count());
        for &offset in plan.hip_offsets {
            let hip_x = start_x + offset;
            let thigh_y = torso_y - plan.torso_height / 2.0 - THIGH_LENGTH / 2.0;
            let shin_y = thigh_y - THIGH_LENGTH / 2.0 - SHIN_LENGTH / 2.0;
            let foot_y = shin_y - SHIN_LENGTH / 2.0 - FOOT_HEIGHT / 2.0;

            let thigh = world.add_box_body(
                hip_x,
                thigh_y,
                THIGH_WIDTH,
                THIGH_LENGTH,
                THIGH_MASS,
                BODY_FRICTION,
            );
            let shin = world.add_box_body(
                hip_x,
                shin_y,
                SHIN_WIDTH,
                SHIN_LENGTH,
                SHIN_MASS,
                BODY_FRICTION,
            );
            let foot = world.add_box_body(
                hip_x,
                foot_y,
                FOOT_WIDTH,
                FOOT_HEIGHT,
                FOOT_MASS,
                FOOT_FRICTION,
            );

            // Hip: torso <-> thigh, pivot at the torso's lower edge.
            let hip = add_hinge(
                &mut world,
                torso,
                thigh,
                point![offset, -plan.torso_height / 2.0],
                point![0.0, THIGH_LENGTH / 2.0],
                plan.hip_limits,
            );
            // Knee: thigh <-> shin.
            let knee = add_hinge(
                &mut world,
                thigh,
                shin,
                point![0.0, -THIGH_LENGTH / 2.0],
                point![0.0, SHIN_LENGTH / 2.0],
                plan.knee_limits,
            );
            // Ankle: foot rigidly geared to the shin, no motor.
            let ankle = FixedJointBuilder::new()
                .local_anchor1(point![0.0, -SHIN_LENGTH / 2.0])
                .local_anchor2(point![0.0, FOOT_HEIGHT / 2.0])
                .build();
            world.impulse_joints.insert(shin, foot, ankle, true);

            legs.push(Leg {
                thigh,
                shin,
                foot,
                hip,
                knee,
            });
        }

        let pair_count = creature_type.foot_pairs().len();
        Ok(Self {
            id,
            creature_type,
            plan,
            genome,
            world,
            torso,
            legs,
            start_x,
            prev_x: start_x,
            alive: true,
            fell: false,
            time_alive: 0.0,
            frames: 0,
            height_sum: 0.0,
            stability_sum: 0.0,
            upright_distance: 0.0,
            energy_sum: 0.0,
            upright_frames: 0,
            steps: 0,
            last_step_sign: vec![None; pair_count],
            fitness: 0.0,
        })
    }

    fn motor_joint(&self, motor: usize) -> ImpulseJointHandle {
        let leg = &self.legs[motor / 2];
        if motor % 2 == 0 {
            leg.hip
        } else {
            leg.knee
        }
    }

    /// Advance one frame: motor commands first, then the solver substeps,
    /// then accumulators and the death check. A dead creature is inert.
    pub fn step_frame(
        &mut self,
        sim: &SimulationConfig,
        control: &ControlConfig,
        fitness: &FitnessConfig,
    ) {
        if !self.alive {
            return;
        }
        self.apply_motors(self.time_alive, control);
        self.world.step(sim.dt, sim.physics_substeps);
        self.time_alive += sim.dt;
        self.accumulate(fitness);
        self.compute_fitness(fitness);
        self.check_death(sim, fitness);
    }

    /// Rhythmic oscillator command plus the reflex correction, per motor.
    fn apply_motors(&mut self, t: f32, control: &ControlConfig) {
        let torso = &self.world.bodies[self.torso];
        let tilt = torso.rotation().angle();
        let angvel = torso.angvel();

        let shared_frequency = self.genome.motor_triple(0).1;
        let tilted = tilt.abs() > control.reflex_tilt_threshold;

        let mut frame_energy = 0.0;
        for motor in 0..self.creature_type.motor_count() {
            let (amplitude, own_frequency, phase) = self.genome.motor_triple(motor);
            let frequency = if control.shared_frequency {
                shared_frequency
            } else {
                own_frequency
            };

            // theta(t) = A sin(2 pi f t + phi); command its derivative.
            let mut rate =
                amplitude * frequency * (TAU * frequency * t + phase).cos() * control.rate_gain;

            let is_hip = motor % 2 == 0;
            if is_hip {
                if tilted {
                    rate += -tilt * control.reflex_tilt_gain;
                }
                rate += -angvel * control.reflex_damping_gain;
            } else if tilted && self.creature_type == CreatureType::Biped {
                rate += -tilt * control.reflex_tilt_gain * control.reflex_knee_fraction;
            }

            frame_energy += rate.abs();
            let joint = self.motor_joint(motor);
            self.world.set_motor_rate(joint, rate);
        }
        self.energy_sum += frame_energy;
    }

    fn accumulate(&mut self, fitness: &FitnessConfig) {
        let torso = &self.world.bodies[self.torso];
        let x = torso.translation().x;
        let y = torso.translation().y;
        let tilt = torso.rotation().angle();

        self.frames += 1;
        self.height_sum += y;
        self.stability_sum += (1.0 - tilt.abs() / FRAC_PI_2).max(0.0);

        let upright = y > fitness.upright_height && tilt.abs() < fitness.upright_angle;
        let dx = x - self.prev_x;
        let moving_forward = dx > 0.0;
        if upright {
            self.upright_frames += 1;
            if moving_forward {
                // Backward motion is never subtracted and never credited.
                self.upright_distance += dx;
            }
        }

        for (pair_idx, pair) in self.creature_type.foot_pairs().iter().enumerate() {
            let xa = self.world.bodies[self.legs[pair[0]].foot].translation().x;
            let xb = self.world.bodies[self.legs[pair[1]].foot].translation().x;
            let offset = xa - xb;
            if offset.abs() > fitness.step_min_offset {
                let sign: i8 = if offset > 0.0 { 1 } else { -1 };
                if let Some(last) = self.last_step_sign[pair_idx] {
                    if sign != last && upright && moving_forward {
                        self.steps += 1;
                    }
                }
                self.last_step_sign[pair_idx] = Some(sign);
            }
        }

        self.prev_x = x;
    }

    fn compute_fitness(&mut self, fitness: &FitnessConfig) {
        let mean_energy = if self.frames > 0 {
            self.energy_sum / self.frames as f32
        } else {
            0.0
        };
        let raw = fitness.distance_weight * self.upright_distance
            + fitness.upright_weight * 0.1 * self.upright_frames as f32
            + fitness.step_reward * self.steps as f32
            - fitness.fall_penalty * if self.fell { 1.0 } else { 0.0 }
            - fitness.energy_penalty_weight * mean_energy;
        self.fitness = raw.max(0.0);
    }

    /// Death state machine: `ALIVE -> DEAD`, terminal. Returns whether the
    /// creature is dead; calling on a dead creature is idempotent.
    pub fn check_death(&mut self, sim: &SimulationConfig, fitness: &FitnessConfig) -> bool {
        if !self.alive {
            return true;
        }

        // Time limit first: a completed trial is a natural end, not a fall.
        if self.time_alive >= sim.trial_duration {
            self.die(false, fitness);
            return true;
        }

        let torso = &self.world.bodies[self.torso];
        let y = torso.translation().y;
        let tilt = torso.rotation().angle();
        let torso_bottom = y - self.plan.torso_height / 2.0;

        if torso_bottom <= GROUND_Y + fitness.ground_tolerance
            || tilt.abs() > fitness.tilt_death_angle
            || y < fitness.min_torso_height
        {
            self.die(true, fitness);
            return true;
        }

        false
    }

    fn die(&mut self, fell: bool, fitness: &FitnessConfig) {
        self.alive = false;
        self.fell = fell;
        // Final fitness computation; frozen afterwards.
        self.compute_fitness(fitness);
    }

    /// Force-terminate a living creature at a frame boundary. Counts as a
    /// natural end, not a fall.
    pub fn kill(&mut self, fitness: &FitnessConfig) {
        if self.alive {
            self.die(false, fitness);
        }
    }

    // --- Read-only observer surface ---

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn creature_type(&self) -> CreatureType {
        self.creature_type
    }

    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn has_fallen(&self) -> bool {
        self.fell
    }

    pub fn fitness(&self) -> f32 {
        self.fitness
    }

    pub fn time_alive(&self) -> f32 {
        self.time_alive
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn torso_position(&self) -> Point2<f32> {
        let torso = &self.world.bodies[self.torso];
        point![torso.translation().x, torso.translation().y]
    }

    pub fn torso_angle(&self) -> f32 {
        self.world.bodies[self.torso].rotation().angle()
    }

    pub fn distance_travelled(&self) -> f32 {
        self.torso_position().x - self.start_x
    }

    pub fn mean_height(&self) -> f32 {
        if self.frames > 0 {
            self.height_sum / self.frames as f32
        } else {
            0.0
        }
    }

    /// Mean of the per-frame stability score `max(0, 1 - |tilt| / (pi/2))`.
    pub fn mean_stability(&self) -> f32 {
        if self.frames > 0 {
            self.stability_sum / self.frames as f32
        } else {
            0.0
        }
    }

    /// Position and angle of every body part (torso first, then
    /// thigh/shin/foot per leg), for drawing consumers.
    pub fn body_states(&self) -> Vec<(Point2<f32>, f32)> {
        let mut parts = vec![self.torso];
        for leg in &self.legs {
            parts.extend([leg.thigh, leg.shin, leg.foot]);
        }
        parts
            .into_iter()
            .map(|handle| {
                let body = &self.world.bodies[handle];
                (
                    point![body.translation().x, body.translation().y],
                    body.rotation().angle(),
                )
            })
            .collect()
    }
}

fn add_hinge(
    world: &mut World,
    body_a: RigidBodyHandle,
    body_b: RigidBodyHandle,
    anchor_a: Point2<f32>,
    anchor_b: Point2<f32>,
    limits: [f32; 2],
) -> ImpulseJointHandle {
    let joint = RevoluteJointBuilder::new()
        .local_anchor1(anchor_a)
        .local_anchor2(anchor_b)
        .limits(limits)
        .motor_model(MotorModel::ForceBased)
        .motor_velocity(0.0, 1.0)
        .motor_max_force(MOTOR_MAX_FORCE)
        .contacts_enabled(false)
        .build();
    world.impulse_joints.insert(body_a, body_b, joint, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::vector;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rapier2d::math::Rotation;

    fn spawn_height(ct: CreatureType, sim: &SimulationConfig) -> f32 {
        ct.plan().leg_height() + sim.spawn_margin
    }

    fn motor_target(creature: &Creature, motor: usize) -> f32 {
        let handle = creature.motor_joint(motor);
        creature
            .world
            .impulse_joints
            .get(handle)
            .unwrap()
            .data
            .as_revolute()
            .unwrap()
            .motor()
            .unwrap()
            .target_vel
    }

    fn place_x(world: &mut World, handle: RigidBodyHandle, x: f32) {
        let y = world.bodies[handle].translation().y;
        world
            .bodies
            .get_mut(handle)
            .unwrap()
            .set_translation(vector![x, y], true);
    }

    fn test_creature(ct: CreatureType) -> Creature {
        let sim = SimulationConfig::default();
        let mut rng = StdRng::seed_from_u64(42);
        let genome = Genome::random(ct.motor_count(), &mut rng);
        Creature::new(ct, sim.start_x, spawn_height(ct, &sim), genome, 0, &sim).unwrap()
    }

    #[test]
    fn biped_morphology() {
        let creature = test_creature(CreatureType::Biped);
        assert_eq!(creature.legs.len(), 2);
        // Ground + torso + 3 parts per leg.
        assert_eq!(creature.world.bodies.len(), 8);
        // Per leg: hip + knee + ankle.
        assert_eq!(creature.world.impulse_joints.len(), 6);
        // Torso plus thigh/shin/foot per leg.
        assert_eq!(creature.body_states().len(), 7);
    }

    #[test]
    fn quadruped_morphology() {
        let creature = test_creature(CreatureType::Quadruped);
        assert_eq!(creature.legs.len(), 4);
        assert_eq!(creature.world.bodies.len(), 14);
        assert_eq!(creature.world.impulse_joints.len(), 12);
    }

    #[test]
    fn rejects_genome_of_wrong_length() {
        let sim = SimulationConfig::default();
        let mut rng = StdRng::seed_from_u64(1);
        // A biped genome against the quadruped profile.
        let genome = Genome::random(4, &mut rng);
        let err = Creature::new(CreatureType::Quadruped, 100.0, 100.0, genome, 0, &sim)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::GenomeLength {
                actual: 12,
                expected: 24,
                motor_count: 8,
            }
        ));
    }

    #[test]
    fn spawned_below_height_threshold_dies_as_a_fall() {
        let sim = SimulationConfig::default();
        let fitness = FitnessConfig::default();
        let mut rng = StdRng::seed_from_u64(2);
        let genome = Genome::random(4, &mut rng);
        // Torso center ends up far below min_torso_height.
        let mut creature = Creature::new(CreatureType::Biped, 100.0, 10.0, genome, 0, &sim).unwrap();

        assert!(creature.check_death(&sim, &fitness));
        assert!(!creature.is_alive());
        assert!(creature.has_fallen());
        // All accumulators are zero, so the fall penalty clamps fitness to 0.
        assert_eq!(creature.fitness(), 0.0);
    }

    #[test]
    fn death_is_monotonic_and_fitness_frozen() {
        let sim = SimulationConfig::default();
        let control = ControlConfig::default();
        let fitness = FitnessConfig::default();
        let mut creature = test_creature(CreatureType::Biped);

        creature.kill(&fitness);
        assert!(!creature.is_alive());
        let frozen = creature.fitness();

        // Further updates and checks must not revive it or move its fitness.
        for _ in 0..10 {
            creature.step_frame(&sim, &control, &fitness);
            assert!(creature.check_death(&sim, &fitness));
        }
        assert!(!creature.is_alive());
        assert_eq!(creature.fitness(), frozen);
        assert_eq!(creature.frames, 0);
    }

    #[test]
    fn stepping_advances_time_and_accumulators() {
        let sim = SimulationConfig::default();
        let control = ControlConfig::default();
        let fitness = FitnessConfig::default();
        let mut creature = test_creature(CreatureType::Biped);

        for _ in 0..10 {
            creature.step_frame(&sim, &control, &fitness);
        }
        assert!(creature.is_alive());
        assert_eq!(creature.frames, 10);
        assert!((creature.time_alive() - 10.0 * sim.dt).abs() < 1e-5);
        assert!(creature.mean_height() > 0.0);
        // Standing roughly straight, stability stays near 1.
        assert!(creature.mean_stability() > 0.5);
        assert!(creature.energy_sum > 0.0);
    }

    #[test]
    fn shared_frequency_ignores_non_lead_frequency_genes() {
        let sim = SimulationConfig::default();
        let fitness = FitnessConfig::default();
        let start_y = spawn_height(CreatureType::Biped, &sim);

        let base: Vec<f32> = (0..4).flat_map(|_| [0.6, 1.0, 0.0]).collect();
        let mut variant = base.clone();
        // Change every frequency gene except motor 0's.
        for motor in 1..4 {
            variant[motor * 3 + 1] = 3.0;
        }
        let build = |genes: Vec<f32>, id| {
            let genome = Genome::from_genes(genes, 4).unwrap();
            Creature::new(CreatureType::Biped, sim.start_x, start_y, genome, id, &sim).unwrap()
        };

        // With the shared flag set, only motor 0's frequency matters: the two
        // genomes command identical motions.
        let shared = ControlConfig {
            shared_frequency: true,
            ..ControlConfig::default()
        };
        let mut a = build(base.clone(), 0);
        let mut b = build(variant.clone(), 1);
        for _ in 0..60 {
            a.step_frame(&sim, &shared, &fitness);
            b.step_frame(&sim, &shared, &fitness);
        }
        let gap = (a.torso_position() - b.torso_position()).norm();
        assert!(gap < 1e-4, "trajectories diverged by {gap}");

        // With per-motor frequencies the same pair diverges.
        let own = ControlConfig::default();
        let mut c = build(base, 2);
        let mut d = build(variant, 3);
        for _ in 0..60 {
            c.step_frame(&sim, &own, &fitness);
            d.step_frame(&sim, &own, &fitness);
        }
        let gap = (c.torso_position() - d.torso_position()).norm();
        assert!(gap > 1e-3, "trajectories stayed identical, gap {gap}");
    }

    #[test]
    fn tilted_torso_gets_opposing_hip_correction() {
        let control = ControlConfig::default();
        let mut upright = test_creature(CreatureType::Biped);
        let mut tilted = test_creature(CreatureType::Biped);

        // Same seed, same genome; the only difference is the torso tilt,
        // applied with zero angular velocity so the damping term cancels.
        let tilt = 0.5;
        assert!(tilt > control.reflex_tilt_threshold);
        let torso = tilted.torso;
        tilted
            .world
            .bodies
            .get_mut(torso)
            .unwrap()
            .set_rotation(Rotation::new(tilt), true);

        upright.apply_motors(0.0, &control);
        tilted.apply_motors(0.0, &control);

        // Hip commands shift by -tilt * gain, opposing the lean.
        for motor in [0, 2] {
            let delta = motor_target(&tilted, motor) - motor_target(&upright, motor);
            assert!(
                (delta + tilt * control.reflex_tilt_gain).abs() < 1e-4,
                "hip {motor} delta {delta}"
            );
        }
        // Biped knees get the configured fraction of the same correction.
        for motor in [1, 3] {
            let delta = motor_target(&tilted, motor) - motor_target(&upright, motor);
            let expected = -tilt * control.reflex_tilt_gain * control.reflex_knee_fraction;
            assert!((delta - expected).abs() < 1e-4, "knee {motor} delta {delta}");
        }
    }

    #[test]
    fn step_counter_requires_a_recorded_sign_before_counting() {
        let sim = SimulationConfig::default();
        let fitness = FitnessConfig::default();
        let mut creature = test_creature(CreatureType::Biped);
        let torso = creature.torso;
        let left = creature.legs[0].foot;
        let right = creature.legs[1].foot;

        // Feet split past the offset threshold for the first time: the sign
        // is recorded but no step is counted.
        place_x(&mut creature.world, left, sim.start_x + 10.0);
        place_x(&mut creature.world, right, sim.start_x - 10.0);
        place_x(&mut creature.world, torso, sim.start_x + 1.0);
        creature.accumulate(&fitness);
        assert_eq!(creature.steps, 0);
        assert_eq!(creature.last_step_sign[0], Some(1));

        // A sign flip while upright and moving forward counts one step.
        place_x(&mut creature.world, left, sim.start_x - 10.0);
        place_x(&mut creature.world, right, sim.start_x + 10.0);
        place_x(&mut creature.world, torso, sim.start_x + 2.0);
        creature.accumulate(&fitness);
        assert_eq!(creature.steps, 1);
        assert_eq!(creature.last_step_sign[0], Some(-1));

        // A flip without forward motion updates the cache but never counts.
        place_x(&mut creature.world, left, sim.start_x + 10.0);
        place_x(&mut creature.world, right, sim.start_x - 10.0);
        creature.accumulate(&fitness);
        assert_eq!(creature.steps, 1);
        assert_eq!(creature.last_step_sign[0], Some(1));

        // Below the threshold nothing is recorded or counted.
        place_x(&mut creature.world, left, sim.start_x + 1.0);
        place_x(&mut creature.world, right, sim.start_x - 1.0);
        place_x(&mut creature.world, torso, sim.start_x + 3.0);
        creature.accumulate(&fitness);
        assert_eq!(creature.steps, 1);
        assert_eq!(creature.last_step_sign[0], Some(1));
    }
}
