//! Orchestration of the distance kernel over a pre/post grid pair.
//!
//! Resources live for as long as the [`Solver`]:
//!
//! ```text
//!               params (uniform, rewritten per query)
//!                  │
//!   pre grid ──► [kernel] ──► pre output ──copy──► pre staging ──map──► Σ
//!   post grid ─► [kernel] ──► post output ─copy──► post staging ─map──► Σ
//! ```
//!
//! Each dataset owns its output buffer, so the second dispatch can
//! never clobber partial sums the first copy has not read yet.

use crate::{
    gpu::{DeviceGrid, GpuContext},
    Distances, KernelConfig, QueryParams, SurfaceDistance, SurfdistError,
};
use geo::geometry::Coord;
use heightmap::Heightmap;
use log::debug;
use std::{mem::size_of, sync::mpsc, sync::Arc, time::Instant};

/// GPU implementation of [`SurfaceDistance`].
///
/// Build with [`Solver::builder`].
pub struct Solver {
    gpu: Arc<GpuContext>,
    config: KernelConfig,
    grid_width: usize,
    pipeline: wgpu::ComputePipeline,
    params: wgpu::Buffer,
    pre: Dataset,
    post: Dataset,
}

/// Everything bound to one elevation grid.
struct Dataset {
    label: &'static str,
    /// Kept alive for `bind_group`.
    _grid: DeviceGrid,
    output: wgpu::Buffer,
    staging: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl Solver {
    pub fn builder() -> SolverBuilder {
        SolverBuilder {
            pre: None,
            post: None,
            config: KernelConfig::default(),
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn grid_width(&self) -> usize {
        self.grid_width
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }
}

pub struct SolverBuilder {
    /// Grid before the change (required).
    pre: Option<Heightmap>,

    /// Grid after the change (required).
    post: Option<Heightmap>,

    /// Kernel sizing and scale factors (defaults to
    /// `KernelConfig::default()`).
    config: KernelConfig,
}

impl SolverBuilder {
    /// Grid before the change (required).
    #[must_use]
    pub fn pre(mut self, grid: Heightmap) -> Self {
        self.pre = Some(grid);
        self
    }

    /// Grid after the change (required).
    #[must_use]
    pub fn post(mut self, grid: Heightmap) -> Self {
        self.post = Some(grid);
        self
    }

    /// Kernel sizing and scale factors.
    #[must_use]
    pub fn config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    /// Compiles the kernel and allocates every device resource.
    pub fn build(self, gpu: &Arc<GpuContext>) -> Result<Solver, SurfdistError> {
        let pre = self.pre.ok_or(SurfdistError::Builder("pre"))?;
        let post = self.post.ok_or(SurfdistError::Builder("post"))?;
        if pre.width() != post.width() {
            return Err(SurfdistError::GridMismatch {
                pre: pre.width(),
                post: post.width(),
            });
        }
        let config = self.config;
        let grid_width = pre.width();
        config.validate(grid_width)?;
        config.validate_limits(&gpu.device.limits())?;

        let now = Instant::now();
        let device = &gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("surfdist BGL"),
            entries: &[
                // 0: elevation grid
                storage_entry(0, true),
                // 1: query params
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(size_of::<QueryParams>() as u64),
                    },
                    count: None,
                },
                // 2: per-group partial sums
                storage_entry(2, false),
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("distance.wgsl"),
            source: wgpu::ShaderSource::Wgsl(config.shader_source().into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("surfdist pipeline layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let constants = config.as_constants();
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("surface distance"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "main",
            compilation_options: wgpu::PipelineCompilationOptions {
                constants: &constants,
                ..Default::default()
            },
            cache: None,
        });

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("surfdist params"),
            size: size_of::<QueryParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let datasets = Dataset::new(gpu, &config, &bgl, &params, &pre, "pre").and_then(|pre| {
            Dataset::new(gpu, &config, &bgl, &params, &post, "post").map(|post| (pre, post))
        });

        // Scopes are popped before any early return.
        let validation = pollster::block_on(device.pop_error_scope());
        let oom = pollster::block_on(device.pop_error_scope());
        let (pre, post) = datasets?;
        if let Some(e) = validation.or(oom) {
            return Err(SurfdistError::Device(e.to_string()));
        }

        debug!("solver setup; {config}, exec: {:?}", now.elapsed());

        Ok(Solver {
            gpu: Arc::clone(gpu),
            config,
            grid_width,
            pipeline,
            params,
            pre,
            post,
        })
    }
}

impl Dataset {
    fn new(
        gpu: &GpuContext,
        config: &KernelConfig,
        bgl: &wgpu::BindGroupLayout,
        params: &wgpu::Buffer,
        grid: &Heightmap,
        label: &'static str,
    ) -> Result<Self, SurfdistError> {
        let grid = DeviceGrid::upload(gpu, grid, label)?;
        let size = u64::from(config.group_count()) * size_of::<f32>() as u64;

        let output = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let staging = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: grid.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: output.as_entire_binding(),
                },
            ],
        });

        Ok(Self {
            label,
            _grid: grid,
            output,
            staging,
            bind_group,
        })
    }

    /// Records one dispatch and the copy of its partial sums into the
    /// staging buffer.
    fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::ComputePipeline,
        groups: u32,
    ) {
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(self.label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.dispatch_workgroups(groups, 1, 1);
        }
        encoder.copy_buffer_to_buffer(&self.output, 0, &self.staging, 0, self.output.size());
    }

    /// Sums the partial sums of a mapped staging buffer.
    fn sum_partials(&self) -> f64 {
        let view = self.staging.slice(..).get_mapped_range();
        let partials: &[f32] = bytemuck::cast_slice(&view);
        partials.iter().copied().map(f64::from).sum()
    }
}

/// Private API
impl Solver {
    /// Maps both staging buffers, sums them and unmaps them again.
    ///
    /// Blocks until the device has finished the submitted batch.
    /// Buffers are unmapped on every path so the next query can reuse
    /// them.
    fn read_back(&self) -> Result<(f64, f64), SurfdistError> {
        let datasets = [&self.pre, &self.post];
        let (tx, rx) = mpsc::channel();
        for (idx, dataset) in datasets.iter().enumerate() {
            let tx = tx.clone();
            dataset
                .staging
                .slice(..)
                .map_async(wgpu::MapMode::Read, move |result| {
                    // The receiver only goes away once read_back returns.
                    let _ = tx.send((idx, result));
                });
        }
        drop(tx);
        self.gpu.device.poll(wgpu::Maintain::Wait);

        let mut results = [None, None];
        for (idx, result) in rx.try_iter() {
            results[idx] = Some(result);
        }

        let mut totals = [0.0; 2];
        let mut failure = None;
        for ((dataset, result), total) in datasets.iter().zip(results).zip(totals.iter_mut()) {
            match result {
                Some(Ok(())) => {
                    *total = dataset.sum_partials();
                    dataset.staging.unmap();
                }
                Some(Err(e)) => {
                    failure.get_or_insert(SurfdistError::Map(e));
                }
                None => {
                    failure.get_or_insert(SurfdistError::Device(format!(
                        "{} staging buffer was never mapped",
                        dataset.label
                    )));
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok((totals[0], totals[1])),
        }
    }
}

impl SurfaceDistance for Solver {
    fn compute_distance(
        &mut self,
        start: Coord<f32>,
        end: Coord<f32>,
    ) -> Result<Distances, SurfdistError> {
        let params = QueryParams::new(start, end, &self.config, self.grid_width)?;
        let groups = self.config.group_count();
        let device = &self.gpu.device;

        let now = Instant::now();
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        self.gpu
            .queue
            .write_buffer(&self.params, 0, bytemuck::bytes_of(&params));

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("surfdist dispatch"),
        });
        self.pre.encode(&mut encoder, &self.pipeline, groups);
        self.post.encode(&mut encoder, &self.pipeline, groups);
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        let validation = pollster::block_on(device.pop_error_scope());
        let oom = pollster::block_on(device.pop_error_scope());
        if let Some(e) = validation.or(oom) {
            return Err(SurfdistError::Device(e.to_string()));
        }
        let submit_runtime = now.elapsed();

        let now = Instant::now();
        let (pre, post) = self.read_back()?;
        let readback_runtime = now.elapsed();

        debug!(
            "distance; groups: {groups}, submit: {submit_runtime:?}, readback: {readback_runtime:?}"
        );

        Ok(Distances { pre, post })
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
