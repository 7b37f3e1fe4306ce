//! End-to-end pipeline behavior on the CPU reference backend.

use image::{Rgba, RgbaImage};
use ipgraph::{
    ArithmeticOp, ConstructionError, CpuBackend, Error, FilterGraph, FilterKind, FilterNode, GraphExecutor,
    Interpolation, ParameterSet, RenderBackend, TextureId,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Every pixel distinct, alpha opaque.
fn pattern(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([
            (x * 255 / width.max(2)) as u8,
            (y * 255 / height.max(2)) as u8,
            ((x * 37 + y * 91) % 256) as u8,
            255,
        ])
    })
}

fn render_single(
    backend: &mut CpuBackend,
    source: TextureId,
    (width, height): (u32, u32),
    kind: FilterKind,
    overrides: &ParameterSet,
) -> RgbaImage {
    let mut graph = FilterGraph::new(width, height, source).unwrap();
    graph.add_node(backend, kind, overrides).unwrap();
    graph.render_nodes(backend).unwrap();
    backend.texture(graph.output_texture().unwrap()).unwrap().clone()
}

fn max_channel_difference(a: &RgbaImage, b: &RgbaImage) -> u8 {
    a.pixels()
        .zip(b.pixels())
        .flat_map(|(p, q)| p.0.into_iter().zip(q.0).map(|(x, y)| x.abs_diff(y)))
        .max()
        .unwrap_or(0)
}

#[test]
fn separable_blur_matches_direct_blur() {
    init_tracing();
    let mut backend = CpuBackend::new();
    let source = backend.upload(pattern(16, 12));

    for (kernel_size, sigma) in [(1, 1.0), (3, 0.8), (5, 1.5), (9, 3.0)] {
        let overrides = ParameterSet::new()
            .with("kernel_size", kernel_size)
            .with("sigma", sigma);
        let direct = render_single(&mut backend, source, (16, 12), FilterKind::GaussianBlur, &overrides);
        let separable = render_single(
            &mut backend,
            source,
            (16, 12),
            FilterKind::SeparableGaussianBlur,
            &overrides,
        );
        assert!(
            max_channel_difference(&direct, &separable) <= 1,
            "kernel_size {kernel_size}, sigma {sigma}"
        );
    }
}

#[test]
fn rendering_twice_gives_identical_output() {
    init_tracing();
    let mut backend = CpuBackend::new();
    let source = backend.upload(pattern(8, 8));

    for kind in FilterKind::ALL {
        let overrides = match kind {
            FilterKind::ImageArithmetic => ParameterSet::new()
                .with("image2", source)
                .with("operation", ArithmeticOp::Add),
            _ => ParameterSet::new(),
        };
        let mut graph = FilterGraph::new(8, 8, source).unwrap();
        graph.add_node(&mut backend, kind, &overrides).unwrap();

        graph.render_nodes(&mut backend).unwrap();
        let first = backend.texture(graph.output_texture().unwrap()).unwrap().clone();
        graph.render_nodes(&mut backend).unwrap();
        let second = backend.texture(graph.output_texture().unwrap()).unwrap();
        assert_eq!(&first, second, "{kind}");
    }
}

#[test]
fn current_texture_follows_the_last_node() {
    let mut backend = CpuBackend::new();
    let source = backend.upload(pattern(4, 4));
    let mut graph = FilterGraph::new(4, 4, source).unwrap();

    for n in 1..=5 {
        graph
            .add_node(&mut backend, FilterKind::HueShift, &ParameterSet::new().with("hue_shift", 10.0))
            .unwrap();
        assert_eq!(graph.len(), n);
        assert_eq!(graph.current_texture(), graph.node(n - 1).unwrap().output_texture());
        assert_eq!(graph.current_texture(), graph.output_texture().unwrap());
    }
}

#[test]
fn subscribed_graph_renders_first_even_if_unused() {
    init_tracing();
    let mut backend = CpuBackend::new();
    let source = backend.upload(pattern(4, 4));
    let mut executor = GraphExecutor::new();

    let mut side = FilterGraph::new(4, 4, source).unwrap();
    side.add_node(&mut backend, FilterKind::Median, &ParameterSet::new()).unwrap();
    let side_output = side.output_texture().unwrap();
    let side = executor.insert(side);

    let mut main = FilterGraph::new(4, 4, source).unwrap();
    main.add_node(&mut backend, FilterKind::Laplacian, &ParameterSet::new())
        .unwrap()
        .add_node(&mut backend, FilterKind::HueShift, &ParameterSet::new())
        .unwrap();
    let main_output = main.output_texture().unwrap();
    let main = executor.insert(main);

    executor.subscribe_sub_graph(main, side).unwrap();
    let stats = executor.initialize_renderer(main, &mut backend).unwrap();

    assert_eq!(stats.graphs, 2);
    assert_eq!(stats.passes, 3);
    let draws = backend.draws();
    assert_eq!(draws[0].target, side_output);
    assert_eq!(draws[0].kind, FilterKind::Median);
    assert_eq!(draws.last().unwrap().target, main_output);
}

#[test]
fn narrow_sigma_keeps_center_tap() {
    let mut backend = CpuBackend::new();
    for image in [RgbaImage::from_pixel(2, 2, Rgba([100, 150, 200, 255])), pattern(2, 2)] {
        let source = backend.upload(image.clone());
        for kind in [FilterKind::GaussianBlur, FilterKind::SeparableGaussianBlur] {
            let overrides = ParameterSet::new().with("kernel_size", 3).with("sigma", 1e-3);
            let out = render_single(&mut backend, source, (2, 2), kind, &overrides);
            assert_eq!(out, image, "{kind}");
        }
    }
}

#[test]
fn largest_kernel_size_renders() {
    let mut backend = CpuBackend::new();
    let source = backend.upload(RgbaImage::from_pixel(4, 4, Rgba([40, 80, 120, 255])));
    let overrides = ParameterSet::new()
        .with("kernel_size", ipgraph::MAX_KERNEL_SIZE)
        .with("sigma", 8.0);
    let out = render_single(&mut backend, source, (4, 4), FilterKind::GaussianBlur, &overrides);
    assert!(out.pixels().all(|p| p.0 == [40, 80, 120, 255]));
}

#[test]
fn invalid_kernel_sizes_and_sigmas_are_rejected() {
    let mut backend = CpuBackend::new();
    let source = backend.upload(pattern(4, 4));
    let mut graph = FilterGraph::new(4, 4, source).unwrap();

    let sized = [
        FilterKind::GaussianBlur,
        FilterKind::SeparableGaussianBlur,
        FilterKind::LaplacianOfGaussian,
        FilterKind::Median,
    ];
    for kind in sized {
        for kernel_size in [0, -1, -3, 2, 6, ipgraph::MAX_KERNEL_SIZE + 2, 46341] {
            let overrides = ParameterSet::new().with("kernel_size", kernel_size);
            let err = graph.add_node(&mut backend, kind, &overrides).unwrap_err();
            assert!(
                matches!(err, Error::InvalidParameter { ref name, .. } if name == "kernel_size"),
                "{kind} accepted kernel_size {kernel_size}"
            );
        }
    }

    let with_sigma = [
        FilterKind::GaussianBlur,
        FilterKind::SeparableGaussianBlur,
        FilterKind::LaplacianOfGaussian,
    ];
    for kind in with_sigma {
        for sigma in [0.0, -2.0, 1e-25] {
            let overrides = ParameterSet::new().with("sigma", sigma);
            let err = graph.add_node(&mut backend, kind, &overrides).unwrap_err();
            assert!(matches!(err, Error::InvalidParameter { ref name, .. } if name == "sigma"));
        }
    }

    let unknown = ParameterSet::new().with("radius", 3);
    assert!(matches!(
        graph.add_node(&mut backend, FilterKind::Median, &unknown),
        Err(Error::InvalidParameter { .. })
    ));
    assert!(graph.is_empty());
}

#[test]
fn laplacian_of_uniform_gray_is_zero() {
    let mut backend = CpuBackend::new();
    let source = backend.upload(RgbaImage::from_pixel(4, 4, Rgba([128, 128, 128, 255])));
    let out = render_single(
        &mut backend,
        source,
        (4, 4),
        FilterKind::Laplacian,
        &ParameterSet::new().with("norm", false),
    );
    assert!(out.pixels().all(|p| p.0[..3] == [0, 0, 0]));
}

#[test]
fn subtracting_an_image_from_itself_is_zero() {
    let mut backend = CpuBackend::new();
    let source = backend.upload(pattern(6, 6));
    let overrides = ParameterSet::new()
        .with("image2", source)
        .with("operation", ArithmeticOp::Sub)
        .with("scale_factor", 1.0)
        .with("offset", 0.0);
    let out = render_single(&mut backend, source, (6, 6), FilterKind::ImageArithmetic, &overrides);
    assert!(out.pixels().all(|p| p.0 == [0, 0, 0, 255]));
}

#[test]
fn arithmetic_scales_rgb_and_keeps_alpha() {
    let mut backend = CpuBackend::new();
    let a = backend.upload(RgbaImage::from_pixel(2, 2, Rgba([51, 51, 51, 200])));
    let b = backend.upload(RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255])));
    let overrides = ParameterSet::new()
        .with("image2", b)
        .with("operation", ArithmeticOp::Mul)
        .with("scale_factor", 2.0);
    let out = render_single(&mut backend, a, (2, 2), FilterKind::ImageArithmetic, &overrides);
    assert!(out.pixels().all(|p| p.0 == [102, 102, 102, 200]));
}

#[test]
fn full_hue_turn_matches_no_turn() {
    let mut backend = CpuBackend::new();
    let source = backend.upload(pattern(8, 8));
    let zero = render_single(
        &mut backend,
        source,
        (8, 8),
        FilterKind::HueShift,
        &ParameterSet::new().with("hue_shift", 0.0),
    );
    let full = render_single(
        &mut backend,
        source,
        (8, 8),
        FilterKind::HueShift,
        &ParameterSet::new().with("hue_shift", 360.0),
    );
    assert!(max_channel_difference(&zero, &full) <= 1);
}

#[test]
fn reciprocal_scaling_restores_sampled_region() {
    let mut backend = CpuBackend::new();
    let original = pattern(8, 8);
    let source = backend.upload(original.clone());

    let mut graph = FilterGraph::new(8, 8, source).unwrap();
    let nearest = |scale: f32| {
        ParameterSet::new()
            .with("scale_x", scale)
            .with("scale_y", scale)
            .with("interpolation", Interpolation::Nearest)
    };
    graph
        .add_node(&mut backend, FilterKind::Scaling, &nearest(0.5))
        .unwrap()
        .add_node(&mut backend, FilterKind::Scaling, &nearest(2.0))
        .unwrap();
    graph.render_nodes(&mut backend).unwrap();

    let out = backend.texture(graph.output_texture().unwrap()).unwrap();
    for y in 0..4 {
        for x in 0..4 {
            assert_eq!(out.get_pixel(x, y), original.get_pixel(x, y), "({x}, {y})");
        }
    }
}

#[test]
fn scaling_without_interpolation_leaves_border_transparent() {
    let mut backend = CpuBackend::new();
    let source = backend.upload(RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255])));
    let overrides = ParameterSet::new()
        .with("scale_x", 2.0)
        .with("scale_y", 2.0)
        .with("interpolation", Interpolation::None);
    let out = render_single(&mut backend, source, (8, 8), FilterKind::Scaling, &overrides);

    assert_eq!(out.get_pixel(3, 3), &Rgba([255, 255, 255, 255]));
    assert_eq!(out.get_pixel(4, 0), &Rgba([0, 0, 0, 0]));
    assert_eq!(out.get_pixel(7, 7), &Rgba([0, 0, 0, 0]));
}

#[test]
fn median_removes_isolated_noise() {
    let mut backend = CpuBackend::new();
    let mut noisy = RgbaImage::from_pixel(6, 6, Rgba([80, 120, 160, 255]));
    noisy.put_pixel(2, 3, Rgba([255, 255, 255, 255]));
    noisy.put_pixel(4, 1, Rgba([0, 0, 0, 255]));
    let source = backend.upload(noisy);

    let out = render_single(
        &mut backend,
        source,
        (6, 6),
        FilterKind::Median,
        &ParameterSet::new().with("kernel_size", 3),
    );
    assert!(out.pixels().all(|p| p.0 == [80, 120, 160, 255]));
}

#[test]
fn single_tap_log_is_identity() {
    let mut backend = CpuBackend::new();
    let original = pattern(5, 5);
    let source = backend.upload(original.clone());
    let out = render_single(
        &mut backend,
        source,
        (5, 5),
        FilterKind::LaplacianOfGaussian,
        &ParameterSet::new().with("kernel_size", 1),
    );
    assert_eq!(out, original);
}

#[test]
fn blur_preserves_a_constant_image() {
    let mut backend = CpuBackend::new();
    let source = backend.upload(RgbaImage::from_pixel(6, 6, Rgba([33, 66, 99, 255])));
    let overrides = ParameterSet::new().with("kernel_size", 7).with("sigma", 4.0);
    for kind in [FilterKind::GaussianBlur, FilterKind::SeparableGaussianBlur] {
        let out = render_single(&mut backend, source, (6, 6), kind, &overrides);
        assert!(out.pixels().all(|p| p.0 == [33, 66, 99, 255]), "{kind}");
    }
}

#[test]
fn sub_graph_output_feeds_a_second_input() {
    init_tracing();
    let mut backend = CpuBackend::new();
    let source = backend.upload(pattern(8, 8));
    let mut executor = GraphExecutor::new();

    let mut copy = FilterGraph::new(8, 8, source).unwrap();
    copy.add_node(&mut backend, FilterKind::LaplacianOfGaussian, &ParameterSet::new())
        .unwrap();
    let copied = copy.output_texture().unwrap();
    let copy = executor.insert(copy);

    let mut diff = FilterGraph::new(8, 8, source).unwrap();
    diff.push_node(
        ipgraph::ImageArithmetic::with_inputs(
            &mut backend,
            8,
            8,
            source,
            copied,
            &ParameterSet::new().with("operation", ArithmeticOp::Sub),
        )
        .unwrap(),
    )
    .unwrap();
    let diff = executor.insert(diff);
    executor.subscribe_sub_graph(diff, copy).unwrap();

    executor.initialize_renderer(diff, &mut backend).unwrap();
    let out = backend.texture(executor.output_texture(diff).unwrap()).unwrap();
    assert!(out.pixels().all(|p| p.0 == [0, 0, 0, 255]));
}

#[test]
fn live_updates_apply_on_next_frame() {
    let mut backend = CpuBackend::new();
    let source = backend.upload(RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255])));
    let mut executor = GraphExecutor::new();
    let mut graph = FilterGraph::new(2, 2, source).unwrap();
    graph
        .add_node(
            &mut backend,
            FilterKind::ImageArithmetic,
            &ParameterSet::new().with("image2", source),
        )
        .unwrap();
    let id = executor.insert(graph);

    executor.initialize_renderer(id, &mut backend).unwrap();
    let out = backend.texture(executor.output_texture(id).unwrap()).unwrap();
    assert_eq!(out.get_pixel(0, 0), &Rgba([20, 40, 60, 255]));

    executor
        .graph_mut(id)
        .unwrap()
        .set_parameter(0, "operation", ArithmeticOp::Sub)
        .unwrap();
    executor.initialize_renderer(id, &mut backend).unwrap();
    let out = backend.texture(executor.output_texture(id).unwrap()).unwrap();
    assert_eq!(out.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
}

#[test]
fn cyclic_subscription_is_a_construction_error() {
    let mut backend = CpuBackend::new();
    let source = backend.upload(pattern(2, 2));
    let mut executor = GraphExecutor::new();
    let a = executor.insert(FilterGraph::new(2, 2, source).unwrap());
    let b = executor.insert(FilterGraph::new(2, 2, source).unwrap());

    executor.subscribe_sub_graph(a, b).unwrap();
    let err = executor.subscribe_sub_graph(b, a).unwrap_err();
    assert!(matches!(
        err,
        Error::Construction(ConstructionError::CyclicSubscription { parent, child }) if parent == b && child == a
    ));
}

#[test]
fn empty_graph_output_is_an_error() {
    let mut backend = CpuBackend::new();
    let source = backend.upload(pattern(2, 2));
    let mut executor = GraphExecutor::new();
    let id = executor.insert(FilterGraph::new(2, 2, source).unwrap());

    let stats = executor.initialize_renderer(id, &mut backend).unwrap();
    assert_eq!(stats.passes, 0);
    assert!(matches!(executor.output_texture(id), Err(Error::EmptyGraph)));
}

#[test]
fn dropping_graphs_releases_render_targets() {
    let mut backend = CpuBackend::new();
    let source = backend.upload(pattern(4, 4));
    {
        let mut graph = FilterGraph::new(4, 4, source).unwrap();
        graph
            .add_node(&mut backend, FilterKind::SeparableGaussianBlur, &ParameterSet::new())
            .unwrap()
            .add_node(&mut backend, FilterKind::Median, &ParameterSet::new())
            .unwrap();
        assert_eq!(backend.live_textures(), 4);
    }
    backend.collect_garbage();
    assert_eq!(backend.live_textures(), 1);
    assert!(backend.texture(source).is_some());
}
