use rapier2d::prelude::*;

// --- Collision Groups ---
// Every part of a creature lives in GROUP_CREATURE and filters against the
// ground only, so a creature's own parts never collide with each other.
// Creatures never share a world, so no cross-creature filtering exists.
pub const GROUP_CREATURE: u32 = 1 << 0;
pub const GROUP_GROUND: u32 = 1 << 1;

pub const GROUND_Y: f32 = 0.0;

/// One independent rapier2d world. Each creature owns exactly one of these;
/// dropping the world removes every body and joint as a unit.
pub struct World {
    gravity: Vector<f32>,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: BroadPhase,
    narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("gravity", &self.gravity)
            .field("bodies", &self.bodies.len())
            .field("colliders", &self.colliders.len())
            .field("impulse_joints", &self.impulse_joints.len())
            .finish_non_exhaustive()
    }
}

impl World {
    pub fn new(gravity_y: f32) -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.erp = 0.8;
        integration_parameters.joint_erp = 0.8;

        Self {
            gravity: vector![0.0, gravity_y],
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: BroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
        }
    }

    /// A single long static horizontal segment at y = 0.
    pub fn add_ground(&mut self, friction: f32) -> RigidBodyHandle {
        let body = RigidBodyBuilder::fixed().build();
        let handle = self.bodies.insert(body);
        let collider =
            ColliderBuilder::segment(point![-1000.0, GROUND_Y], point![100_000.0, GROUND_Y])
                .friction(friction)
                .collision_groups(InteractionGroups::new(
                    GROUP_GROUND.into(),
                    GROUP_CREATURE.into(),
                ))
                .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        handle
    }

    /// A dynamic box part of a creature.
    pub fn add_box_body(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        mass: f32,
        friction: f32,
    ) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(vector![x, y])
            .build();
        let handle = self.bodies.insert(body);
        let collider = ColliderBuilder::cuboid(width / 2.0, height / 2.0)
            .mass(mass)
            .friction(friction)
            .collision_groups(InteractionGroups::new(
                GROUP_CREATURE.into(),
                GROUP_GROUND.into(),
            ))
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        handle
    }

    /// Advance one frame as `substeps` solver steps of size `dt / substeps`.
    pub fn step(&mut self, dt: f32, substeps: usize) {
        self.integration_parameters.dt = dt / substeps as f32;
        for _ in 0..substeps {
            self.physics_pipeline.step(
                &self.gravity,
                &self.integration_parameters,
                &mut self.island_manager,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.bodies,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                &mut self.ccd_solver,
                Some(&mut self.query_pipeline),
                &(),
                &(),
            );
        }
    }

    /// Write a revolute motor's target angular rate. The solver enforces the
    /// max-force cap configured at build time.
    pub fn set_motor_rate(&mut self, joint: ImpulseJointHandle, rate: f32) {
        if let Some(joint) = self.impulse_joints.get_mut(joint) {
            if let Some(revolute) = joint.data.as_revolute_mut() {
                revolute.set_motor_velocity(rate, 1.0);
            }
        }
    }
}
