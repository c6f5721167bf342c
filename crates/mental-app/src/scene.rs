//! The demo scene: a floor, a ring of cubes, a grid of PBR spheres, two
//! glass panes, one directional light and four orbiting point lights.

use std::f32::consts::TAU;
use std::path::Path;
use std::sync::Arc;

use glam::{Mat4, Vec3};
use mental_lighting::{DirectionalLight, LightError, LightSet, PointLight};
use mental_render::{
    InstanceData, LightOrbit, Material, MeshData, RenderableMesh, Renderer, SceneObject, SceneState,
    TextureLoadOptions, TextureRole,
};

use crate::AppError;

pub const CUBE_RING_COUNT: usize = 6;
pub const CUBE_RING_RADIUS: f32 = 3.0;
pub const SPHERE_GRID: usize = 5;
pub const SPHERE_SPACING: f32 = 1.2;

const FLOOR_TEXTURE: &str = "resources/textures/wood.png";

const POINT_LIGHT_COLORS: [Vec3; 4] = [
    Vec3::new(1.0, 0.9, 0.8),
    Vec3::new(1.0, 0.3, 0.2),
    Vec3::new(0.2, 0.5, 1.0),
    Vec3::new(0.3, 1.0, 0.4),
];

/// One directional light plus four point lights orbiting the origin.
/// The first point light renders the shadow cubemap.
pub fn demo_lights() -> Result<(LightSet, Vec<LightOrbit>), LightError> {
    let mut lights = LightSet::new();
    lights.directional = Some(DirectionalLight {
        direction: Vec3::new(-0.4, -1.0, -0.3).normalize(),
        intensity: 1.5,
        ..Default::default()
    });

    let mut orbits = Vec::with_capacity(POINT_LIGHT_COLORS.len());
    for (i, color) in POINT_LIGHT_COLORS.into_iter().enumerate() {
        let orbit = LightOrbit {
            light: i,
            center: Vec3::new(0.0, 1.5 + 0.5 * i as f32, 0.0),
            radius: 4.0 + i as f32,
            speed: 0.4 + 0.15 * i as f32,
            phase: TAU * i as f32 / POINT_LIGHT_COLORS.len() as f32,
        };
        let index = lights.add_point_light(PointLight::new(orbit.position_at(0.0), color, 8.0))?;
        orbits.push(LightOrbit { light: index, ..orbit });
    }
    lights.set_shadow_caster(Some(0))?;
    Ok((lights, orbits))
}

/// Model matrices of the cube ring, each turned to face the center.
pub fn cube_ring() -> Vec<InstanceData> {
    (0..CUBE_RING_COUNT)
        .map(|i| {
            let angle = TAU * i as f32 / CUBE_RING_COUNT as f32;
            let position = Vec3::new(angle.cos(), 0.0, angle.sin()) * CUBE_RING_RADIUS + Vec3::Y * 0.5;
            InstanceData::new(Mat4::from_translation(position) * Mat4::from_rotation_y(-angle))
        })
        .collect()
}

/// Sphere positions with metallic rising by row and roughness by column.
pub fn sphere_grid() -> Vec<(Vec3, f32, f32)> {
    let half = (SPHERE_GRID - 1) as f32 * 0.5;
    let step = 1.0 / (SPHERE_GRID - 1) as f32;
    let mut spheres = Vec::with_capacity(SPHERE_GRID * SPHERE_GRID);
    for row in 0..SPHERE_GRID {
        for col in 0..SPHERE_GRID {
            let position = Vec3::new(
                (col as f32 - half) * SPHERE_SPACING,
                1.0 + row as f32 * SPHERE_SPACING,
                -6.0,
            );
            spheres.push((position, row as f32 * step, (col as f32 * step).clamp(0.05, 1.0)));
        }
    }
    spheres
}

pub fn build_demo_scene(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    renderer: &mut Renderer,
) -> Result<SceneState, AppError> {
    let (lights, orbits) = demo_lights()?;
    let mut scene = SceneState::new(lights);
    scene.orbits = orbits;

    let floor_albedo = renderer.textures_mut().load_or_default(
        device,
        queue,
        Path::new(FLOOR_TEXTURE),
        TextureRole::Albedo,
        TextureLoadOptions::for_role(TextureRole::Albedo),
    );
    let mut floor_material = Material {
        roughness: 0.8,
        ..Default::default()
    };
    floor_material.texture_set.set(TextureRole::Albedo, floor_albedo);
    let floor = mesh(renderer, device, "floor", &MeshData::plane(20.0, 8.0), floor_material);
    scene.opaque.push(SceneObject::new(device, floor, vec![InstanceData::new(Mat4::IDENTITY)]));

    let cube_material = Material {
        albedo_factor: Vec3::new(0.9, 0.85, 0.8),
        roughness: 0.5,
        ..Default::default()
    };
    let cube = mesh(renderer, device, "cube", &MeshData::cube(), cube_material);
    scene.opaque.push(SceneObject::new(device, cube, cube_ring()));

    let sphere_data = MeshData::uv_sphere(32, 16);
    for (i, (position, metallic, roughness)) in sphere_grid().into_iter().enumerate() {
        let material = Material {
            albedo_factor: Vec3::new(0.5, 0.0, 0.0),
            metallic,
            roughness,
            ..Default::default()
        };
        let sphere = mesh(renderer, device, &format!("sphere-{i}"), &sphere_data, material);
        let model = Mat4::from_translation(position) * Mat4::from_scale(Vec3::splat(0.45));
        scene.opaque.push(SceneObject::new(device, sphere, vec![InstanceData::new(model)]));
    }

    let glass_material = Material {
        albedo_factor: Vec3::new(0.6, 0.8, 1.0),
        opacity: 0.4,
        ..Default::default()
    };
    let glass = mesh(renderer, device, "glass", &MeshData::quad(), glass_material);
    let panes = [Vec3::new(-1.0, 1.0, 1.5), Vec3::new(0.8, 1.0, 3.0)]
        .into_iter()
        .map(|p| InstanceData::new(Mat4::from_translation(p) * Mat4::from_scale(Vec3::splat(1.5))))
        .collect();
    scene
        .transparent
        .push(SceneObject::new(device, glass, panes).with_shadow(false));

    tracing::info!(
        "Demo scene: {} opaque objects, {} transparent, {} point lights",
        scene.opaque.len(),
        scene.transparent.len(),
        scene.lights.point_lights().len()
    );
    Ok(scene)
}

fn mesh(
    renderer: &Renderer,
    device: &wgpu::Device,
    label: &str,
    data: &MeshData,
    material: Material,
) -> Arc<RenderableMesh> {
    Arc::new(RenderableMesh::new(
        device,
        label,
        data,
        material,
        renderer.material_layout(),
        renderer.textures(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mental_lighting::MAX_POINT_LIGHTS;

    #[test]
    fn test_demo_lights() {
        let (lights, orbits) = demo_lights().unwrap();
        assert!(lights.directional.is_some());
        assert_eq!(lights.point_lights().len(), 4);
        assert!(lights.point_lights().len() <= MAX_POINT_LIGHTS);
        assert_eq!(lights.shadow_caster().map(|(i, _)| i), Some(0));
        for (orbit, light) in orbits.iter().zip(lights.point_lights()) {
            assert!(orbit.position_at(0.0).abs_diff_eq(light.position, 1e-5));
        }
    }

    #[test]
    fn test_cube_ring_on_circle() {
        let ring = cube_ring();
        assert_eq!(ring.len(), CUBE_RING_COUNT);
        for instance in ring {
            let p = instance.position();
            assert!((Vec3::new(p.x, 0.0, p.z).length() - CUBE_RING_RADIUS).abs() < 1e-4);
            assert!((p.y - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_sphere_grid_spans_material_range() {
        let grid = sphere_grid();
        assert_eq!(grid.len(), SPHERE_GRID * SPHERE_GRID);
        let metallic: Vec<f32> = grid.iter().map(|(_, m, _)| *m).collect();
        let roughness: Vec<f32> = grid.iter().map(|(_, _, r)| *r).collect();
        assert_eq!(metallic.iter().cloned().fold(f32::MAX, f32::min), 0.0);
        assert_eq!(metallic.iter().cloned().fold(0.0, f32::max), 1.0);
        assert!(roughness.iter().all(|r| (0.05..=1.0).contains(r)));
    }
}
