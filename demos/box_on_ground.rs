use particle_lcp::*;

fn main() -> Result<(), SolverError> {
    let settings = SolverSettings::default().with_mode(SolverMode::Spinning);
    let mut world = PhysicsWorld::new(settings)?;
    let dt = settings.step_size;

    let ground = world.add_rigidbody(RigidBody::fixed(DVec3::ZERO));
    let crate_box = world.add_rigidbody(
        RigidBody::new(
            DVec3::new(0.0, 0.5, 0.0),
            MassProperties::solid_box(DVec3::splat(0.5), 2.0),
        )
        .with_velocity(DVec3::new(3.0, 0.0, 0.0), DVec3::new(0.0, 1.0, 0.0))
        .with_material(Material::rubber()),
    );

    for frame in 0..120 {
        world.clear_contacts();
        let center = world.bodies[crate_box].position;
        for (dx, dz) in [(-0.5, -0.5), (0.5, -0.5), (-0.5, 0.5), (0.5, 0.5)] {
            let point = DVec3::new(center.x + dx, 0.0, center.z + dz);
            world.add_contact(ground, crate_box, point, DVec3::Y, 0.0)?;
        }

        let report = world.step()?;
        let body = &mut world.bodies[crate_box];
        body.position += body.velocity.linear * dt;

        if frame % 20 == 0 {
            println!(
                "frame {frame:3}: x = {:.3}, vx = {:.3}, wy = {:.3}, iterations = {}, residual = {:.2e}",
                body.position.x,
                body.velocity.linear.x,
                body.velocity.angular.y,
                report.total_iterations,
                report.residual,
            );
        }
    }

    println!("Box came to rest after sliding {:.2} m", world.bodies[crate_box].position.x);
    Ok(())
}
