//! Spins a textured triangle inside a wireframe of its bounds.
//!
//! Expects compiled shader blobs next to the working directory:
//! `shaders/lighting_vs.cso`, `shaders/lighting_ps.cso`,
//! `shaders/line_vs.cso`, `shaders/line_ps.cso`, `shaders/culling_cs.cso`.
//! Pass a different directory as the first argument.

#[cfg(target_os = "windows")]
fn main() {
    use std::time::Instant;

    use glam::{Mat4, Vec3, Vec4};
    use winit::{
        dpi::PhysicalSize,
        event::{Event, WindowEvent},
        event_loop::EventLoop,
        window::WindowBuilder,
    };

    use geometry::Aabb;
    use renderer::{
        Camera, Config, FrameData, MeshCreateInfo, MeshInstance, Renderer, ShaderSet, Vertex,
    };

    env_logger::init();

    let shader_dir = std::env::args().nth(1).unwrap_or_else(|| "shaders".into());
    let load = |name: &str| {
        let path = format!("{shader_dir}/{name}.cso");
        std::fs::read(&path).unwrap_or_else(|error| panic!("failed to read {path}: {error}"))
    };

    let shaders = ShaderSet {
        lighting_vs: load("lighting_vs"),
        lighting_ps: load("lighting_ps"),
        line_vs: load("line_vs"),
        line_ps: load("line_ps"),
        culling_cs: load("culling_cs"),
    };

    let event_loop = EventLoop::new();
    let window = WindowBuilder::new()
        .with_title("renderer")
        .with_inner_size(PhysicalSize::new(1280, 720))
        .build(&event_loop)
        .unwrap();

    let mut renderer = Renderer::new(&window, shaders, &Config::default()).unwrap();

    let aabb = Aabb::new(Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0));

    let mut context = renderer.open_upload_context();
    let mesh = renderer.create_mesh(
        &mut context,
        &MeshCreateInfo {
            vertices: &[
                Vertex {
                    pos: [0.0, 0.0, 0.0],
                    norm: [0.0, 0.0, 1.0],
                    uv: [0.0, 1.0],
                },
                Vertex {
                    pos: [1.0, 0.0, 0.0],
                    norm: [0.0, 0.0, 1.0],
                    uv: [1.0, 1.0],
                },
                Vertex {
                    pos: [0.0, 1.0, 0.0],
                    norm: [0.0, 0.0, 1.0],
                    uv: [0.0, 0.0],
                },
            ],
            indices: &[0, 1, 2],
            aabb,
        },
    );
    let ticket = renderer.submit_upload_context(context);
    renderer.flush_upload(ticket);

    // The 12 edges of the mesh bound, drawn as the line overlay.
    let line_vertices: Vec<Vec4> = aabb
        .corners()
        .iter()
        .map(|corner| corner.extend(1.0))
        .collect();
    let line_indices: Vec<u32> = vec![
        0, 1, 1, 3, 3, 2, 2, 0, // near face
        4, 5, 5, 7, 7, 6, 6, 4, // far face
        0, 4, 1, 5, 2, 6, 3, 7, // connecting edges
    ];

    let started = Instant::now();

    event_loop.run(move |event, _, control_flow| {
        control_flow.set_poll();

        match event {
            Event::WindowEvent {
                event: WindowEvent::CloseRequested,
                ..
            } => control_flow.set_exit(),

            Event::WindowEvent {
                event: WindowEvent::Resized(size),
                ..
            } => renderer.handle_resize(size.width, size.height),

            Event::MainEventsCleared => {
                let angle = started.elapsed().as_secs_f32();

                let frame = FrameData {
                    camera: Camera {
                        transform: Mat4::from_translation(Vec3::new(0.0, 0.0, 3.0)),
                        near_plane: 0.1,
                        far_plane: 10.0,
                        fov: std::f32::consts::FRAC_PI_2,
                    },
                    instances: &[MeshInstance {
                        mesh,
                        material: None,
                        transform: Mat4::from_rotation_y(angle),
                    }],
                    line_vertices: &line_vertices,
                    line_indices: &line_indices,
                };

                renderer.render_frame(&frame);
            }

            _ => {}
        }
    });
}

#[cfg(not(target_os = "windows"))]
fn main() {
    eprintln!("this example needs the Direct3D 12 backend (Windows only)");
}
