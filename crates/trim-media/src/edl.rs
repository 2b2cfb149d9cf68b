//! Translate an edit decision list into FFmpeg invocations.
//!
//! The builder is pure: identical inputs always produce identical argument
//! lists, in the same order.
//!
//! - [`TrimMode::Single`]: every segment is cut from every input and the
//!   pieces are joined segment-major, source-minor into `<name>.mp4`.
//! - [`TrimMode::MultiRendition`]: one invocation per input, each cutting the
//!   same segments from that input only, written to `<name>_<index>.mp4`.

use std::path::{Path, PathBuf};

use trim_models::{Edl, TrimMode};

use crate::command::{FfmpegCommand, Invocation};
use crate::error::{MediaError, MediaResult};
use crate::filters::{filter_concat, filter_trim_audio, filter_trim_video};

/// Output file name for a single-mode job.
pub fn single_output_name(edl: &Edl) -> String {
    format!("{}.mp4", edl.name)
}

/// Output file name for one rendition.
pub fn rendition_output_name(edl: &Edl, source_index: usize) -> String {
    format!("{}_{}.mp4", edl.name, source_index)
}

/// Build the filter graph cutting every segment from every input.
///
/// Labels are `v{segment}_{input}` / `a{segment}_{input}`.
pub fn single_filter_graph(edl: &Edl, input_count: usize) -> String {
    let mut graph = String::new();
    let mut labels = Vec::with_capacity(edl.segments.len() * input_count);

    for (i, segment) in edl.segments.iter().enumerate() {
        for j in 0..input_count {
            let video = format!("v{}_{}", i, j);
            let audio = format!("a{}_{}", i, j);
            let input = j.to_string();
            graph.push_str(&filter_trim_video(&input, segment, &video));
            graph.push_str(&filter_trim_audio(&input, segment, &audio));
            labels.push((video, audio));
        }
    }

    graph.push_str(&filter_concat(
        labels.iter().map(|(v, a)| (v.as_str(), a.as_str())),
    ));
    graph
}

/// Build the filter graph cutting every segment from input `0`.
///
/// Labels are `v{segment}` / `a{segment}`.
pub fn rendition_filter_graph(edl: &Edl) -> String {
    let mut graph = String::new();
    let mut labels = Vec::with_capacity(edl.segments.len());

    for (i, segment) in edl.segments.iter().enumerate() {
        let video = format!("v{}", i);
        let audio = format!("a{}", i);
        graph.push_str(&filter_trim_video("0", segment, &video));
        graph.push_str(&filter_trim_audio("0", segment, &audio));
        labels.push((video, audio));
    }

    graph.push_str(&filter_concat(
        labels.iter().map(|(v, a)| (v.as_str(), a.as_str())),
    ));
    graph
}

fn concat_command(output: PathBuf, graph: String) -> FfmpegCommand {
    FfmpegCommand::new(output)
        .filter_complex(graph)
        .map("[outv]")
        .map("[outa]")
}

/// Build the one invocation joining every segment of every input.
pub fn build_single_invocation(
    edl: &Edl,
    inputs: &[PathBuf],
    output_dir: &Path,
) -> MediaResult<Invocation> {
    if edl.segments.is_empty() {
        return Err(MediaError::NoSegments);
    }
    if inputs.is_empty() {
        return Err(MediaError::NoInputs);
    }

    let output = output_dir.join(single_output_name(edl));
    Ok(concat_command(output, single_filter_graph(edl, inputs.len()))
        .inputs(inputs)
        .expected_duration(edl.total_duration() * inputs.len() as f64)
        .into_invocation())
}

/// Build the invocation for the rendition of input `source_index`.
pub fn build_rendition_invocation(
    edl: &Edl,
    source_index: usize,
    input: &Path,
    output_dir: &Path,
) -> MediaResult<Invocation> {
    if edl.segments.is_empty() {
        return Err(MediaError::NoSegments);
    }

    let output = output_dir.join(rendition_output_name(edl, source_index));
    Ok(concat_command(output, rendition_filter_graph(edl))
        .input(input)
        .expected_duration(edl.total_duration())
        .into_invocation())
}

/// Build the invocations for `edl` over `inputs`.
///
/// Single mode yields exactly one invocation; MultiRendition yields one per
/// input, in input order.
pub fn build_invocations(
    edl: &Edl,
    inputs: &[PathBuf],
    mode: TrimMode,
    output_dir: &Path,
) -> MediaResult<Vec<Invocation>> {
    if edl.segments.is_empty() {
        return Err(MediaError::NoSegments);
    }
    if inputs.is_empty() {
        return Err(MediaError::NoInputs);
    }

    match mode {
        TrimMode::Single => Ok(vec![build_single_invocation(edl, inputs, output_dir)?]),
        TrimMode::MultiRendition => inputs
            .iter()
            .enumerate()
            .map(|(index, input)| build_rendition_invocation(edl, index, input, output_dir))
            .collect(),
    }
}
