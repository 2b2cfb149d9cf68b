//! Filter graph fragments for cutting and joining streams.

use trim_models::Segment;

/// Trim a video stream to `segment` and reset its timestamps.
pub fn filter_trim_video(input: &str, segment: &Segment, label: &str) -> String {
    format!(
        "[{}:v]trim=start={}:end={},setpts=PTS-STARTPTS,format=yuv420p[{}];",
        input, segment.start, segment.end, label
    )
}

/// Trim an audio stream to `segment` and reset its timestamps.
pub fn filter_trim_audio(input: &str, segment: &Segment, label: &str) -> String {
    format!(
        "[{}:a]atrim=start={}:end={},asetpts=PTS-STARTPTS[{}];",
        input, segment.start, segment.end, label
    )
}

/// Concatenate `(video, audio)` label pairs into `[outv][outa]`.
pub fn filter_concat<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut graph = String::new();
    let mut count = 0;
    for (video, audio) in pairs {
        graph.push_str(&format!("[{}][{}]", video, audio));
        count += 1;
    }
    graph.push_str(&format!("concat=n={}:v=1:a=1[outv][outa]", count));
    graph
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_fragments() {
        let seg = Segment::new(0.0, 5.0);
        assert_eq!(
            filter_trim_video("0", &seg, "v0_0"),
            "[0:v]trim=start=0:end=5,setpts=PTS-STARTPTS,format=yuv420p[v0_0];"
        );
        assert_eq!(
            filter_trim_audio("1", &Segment::new(1.5, 2.25), "a0_1"),
            "[1:a]atrim=start=1.5:end=2.25,asetpts=PTS-STARTPTS[a0_1];"
        );
    }

    #[test]
    fn test_concat() {
        let graph = filter_concat([("v0", "a0"), ("v1", "a1")]);
        assert_eq!(graph, "[v0][a0][v1][a1]concat=n=2:v=1:a=1[outv][outa]");
    }
}
