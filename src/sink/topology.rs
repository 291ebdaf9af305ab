//! Graph topology table
//!
//! Maps each configuration axis (video present / codec, audio present /
//! codec) to the stages of its ingestion branch, and derives the output
//! filename for a session.

use super::types::{
    AudioCodec, Branch, EndpointId, GraphLayout, GraphPlan, SinkError, StageDescriptor,
    StreamParams, VideoCodec,
};
use crate::recorder::state::AudioFormat;
use std::path::PathBuf;

fn video_stages(codec: VideoCodec) -> Vec<StageDescriptor> {
    match codec {
        VideoCodec::H264 => vec![StageDescriptor::Queue, StageDescriptor::H264Parse],
        VideoCodec::H265 => vec![StageDescriptor::Queue, StageDescriptor::H265Parse],
    }
}

fn audio_stages(codec: AudioCodec) -> Vec<StageDescriptor> {
    match codec {
        AudioCodec::AacEld => vec![
            StageDescriptor::Queue,
            StageDescriptor::AacParse,
            StageDescriptor::Queue,
        ],
        // mp4mux takes raw ALAC frames directly
        AudioCodec::Alac => vec![StageDescriptor::Queue],
    }
}

/// Build the structured plan for `layout`, writing to `location`
pub fn plan(
    layout: &GraphLayout,
    format: &AudioFormat,
    location: PathBuf,
) -> Result<GraphPlan, SinkError> {
    if layout.is_empty() {
        return Err(SinkError::Construction(
            "layout carries neither video nor audio".to_string(),
        ));
    }

    let mut branches = Vec::with_capacity(2);
    if let Some(codec) = layout.video {
        branches.push(Branch {
            endpoint: EndpointId::Video,
            params: StreamParams::video(codec),
            stages: video_stages(codec),
        });
    }
    if let Some(codec) = layout.audio {
        branches.push(Branch {
            endpoint: EndpointId::Audio,
            params: StreamParams::audio(codec, format),
            stages: audio_stages(codec),
        });
    }

    Ok(GraphPlan {
        layout: *layout,
        branches,
        location,
    })
}

/// `{template}.{counter}.{video tag.}{audio tag.}mp4`
pub fn output_path(template: &str, counter: u32, layout: &GraphLayout) -> PathBuf {
    let mut filename = format!("{}.{}.", template, counter);
    if let Some(codec) = layout.video {
        filename.push_str(codec.tag());
        filename.push('.');
    }
    if let Some(codec) = layout.audio {
        filename.push_str(codec.tag());
        filename.push('.');
    }
    filename.push_str("mp4");
    PathBuf::from(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layouts() -> Vec<GraphLayout> {
        let mut all = Vec::new();
        for video in [None, Some(VideoCodec::H264), Some(VideoCodec::H265)] {
            for audio in [None, Some(AudioCodec::AacEld), Some(AudioCodec::Alac)] {
                all.push(GraphLayout { video, audio });
            }
        }
        all
    }

    #[test]
    fn test_every_layout_has_matching_branches() {
        for layout in layouts() {
            let result = plan(&layout, &AudioFormat::default(), PathBuf::from("out.mp4"));
            if layout.is_empty() {
                assert!(result.is_err());
                continue;
            }
            let plan = result.unwrap();
            assert_eq!(plan.branches.len(), layout.endpoints().len());
            for endpoint in layout.endpoints() {
                let branch = plan.branch(endpoint).unwrap();
                assert_eq!(branch.stages.first(), Some(&StageDescriptor::Queue));
            }
        }
    }

    #[test]
    fn test_parser_selection() {
        let layout = GraphLayout {
            video: Some(VideoCodec::H265),
            audio: Some(AudioCodec::Alac),
        };
        let plan = plan(&layout, &AudioFormat::default(), PathBuf::from("x.mp4")).unwrap();

        let video = plan.branch(EndpointId::Video).unwrap();
        assert!(video.stages.contains(&StageDescriptor::H265Parse));
        assert!(!video.stages.contains(&StageDescriptor::H264Parse));

        let audio = plan.branch(EndpointId::Audio).unwrap();
        assert!(!audio.stages.contains(&StageDescriptor::AacParse));
    }

    #[test]
    fn test_plan_description() {
        let layout = GraphLayout {
            video: Some(VideoCodec::H264),
            audio: Some(AudioCodec::AacEld),
        };
        let plan = plan(&layout, &AudioFormat::default(), PathBuf::from("rec.1.H264.AAC.mp4"))
            .unwrap();
        assert_eq!(
            plan.to_string(),
            "appsrc name=video_src format=time is-live=true ! queue ! h264parse ! mux. \
             appsrc name=audio_src format=time is-live=true ! queue ! aacparse ! queue ! mux. \
             mp4mux name=mux ! filesink name=filesink location=rec.1.H264.AAC.mp4"
        );
    }

    #[test]
    fn test_output_path_tags() {
        let both = GraphLayout {
            video: Some(VideoCodec::H265),
            audio: Some(AudioCodec::AacEld),
        };
        assert_eq!(
            output_path("/tmp/rec", 3, &both),
            PathBuf::from("/tmp/rec.3.H265.AAC.mp4")
        );

        let audio_only = GraphLayout {
            video: None,
            audio: Some(AudioCodec::Alac),
        };
        assert_eq!(
            output_path("rec", 1, &audio_only),
            PathBuf::from("rec.1.ALAC.mp4")
        );

        let video_with_alac = GraphLayout {
            video: Some(VideoCodec::H264),
            audio: Some(AudioCodec::Alac),
        };
        assert_eq!(
            output_path("rec", 2, &video_with_alac),
            PathBuf::from("rec.2.H264.ALAC.mp4")
        );
    }
}
