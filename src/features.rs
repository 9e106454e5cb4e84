use serde::Serialize;

use crate::models::Artifact;
use crate::params::{ParamSchema, Platform};
use crate::policy::AcceptPolicy;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Encoding {
    Json,
    Multipart,
}

/// The separate upload step some features need before generation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEndpoint {
    pub path: &'static str,
    pub file_field: &'static str,
    pub id_field: &'static str,
    pub url_field: &'static str,
    pub failure_message: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateEndpoint {
    pub path: &'static str,
    pub encoding: Encoding,
    /// Multipart only: the form field carrying the raw file.
    pub file_field: Option<&'static str>,
    pub failure_message: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DownloadNaming {
    /// `enhanced-<source file name>`
    EnhancedSource,
    /// `Thumbnail-<timestamp>.jpg`
    Timestamped,
    /// `<prefix>_<n>.<ext>`, 1-based
    Numbered { prefix: &'static str, ext: &'static str },
    /// Last path segment of the artifact URL.
    UrlSegment,
}

/// How the value under `result_field` is read.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ResultKind {
    /// URLs or artifact objects.
    Media,
    /// Hashtag strings, flat or keyed by platform.
    Hashtags,
}

/// Everything that differs between the dashboard's feature pages.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSpec {
    pub slug: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub accept: AcceptPolicy,
    pub missing_file_message: &'static str,
    pub upload: Option<UploadEndpoint>,
    pub generate: GenerateEndpoint,
    pub params: ParamSchema,
    pub result_field: &'static str,
    pub result_kind: ResultKind,
    pub analysis_fields: Vec<&'static str>,
    pub download_naming: DownloadNaming,
}

fn video_upload() -> UploadEndpoint {
    UploadEndpoint {
        path: "/upload",
        file_field: "video",
        id_field: "videoId",
        url_field: "videoUrl",
        failure_message: "Failed to upload video",
    }
}

impl FeatureSpec {
    pub fn generate_shorts() -> Self {
        Self {
            slug: "generate-shorts",
            title: "Generate Shorts",
            description: "Create engaging short-form video content automatically",
            accept: AcceptPolicy::video(),
            missing_file_message: "Please upload a video file.",
            upload: Some(video_upload()),
            generate: GenerateEndpoint {
                path: "/generate-shorts",
                encoding: Encoding::Json,
                file_field: None,
                failure_message: "Failed to generate shorts",
            },
            params: ParamSchema::default().count("numShorts", "Number of Shorts to Generate (1-3)", 1, 3, 1),
            result_field: "shorts",
            result_kind: ResultKind::Media,
            analysis_fields: vec!["aiInsights", "analysis"],
            download_naming: DownloadNaming::Numbered { prefix: "short", ext: "mp4" },
        }
    }

    pub fn viral_reels() -> Self {
        Self {
            slug: "viral-reels",
            title: "Viral Reels",
            description: "Produce trending reels that capture audience attention",
            accept: AcceptPolicy::video(),
            missing_file_message: "Please upload a video.",
            upload: Some(video_upload()),
            generate: GenerateEndpoint {
                path: "/generate-viral-reels",
                encoding: Encoding::Json,
                file_field: None,
                failure_message: "Failed to generate reels",
            },
            params: ParamSchema::default().count("numReels", "Number of reels (1-3)", 1, 3, 1),
            result_field: "reels",
            result_kind: ResultKind::Media,
            analysis_fields: vec!["aiInsights", "analysis"],
            download_naming: DownloadNaming::Numbered { prefix: "viral_reel", ext: "mp4" },
        }
    }

    pub fn exciting_thumbnails() -> Self {
        Self {
            slug: "exciting-thumbnails",
            title: "Exciting Thumbnails",
            description: "Get eye-catching thumbnails that drive clicks",
            accept: AcceptPolicy::video(),
            missing_file_message: "Please upload a video.",
            upload: Some(UploadEndpoint {
                failure_message: "Video upload failed.",
                ..video_upload()
            }),
            generate: GenerateEndpoint {
                path: "/getexcitingthumbnails",
                encoding: Encoding::Multipart,
                file_field: Some("video"),
                failure_message: "Thumbnail generation failed.",
            },
            params: ParamSchema::default().count("numThumbnails", "Number of thumbnails (1-3)", 1, 3, 1),
            result_field: "thumbnails",
            result_kind: ResultKind::Media,
            analysis_fields: vec!["analysis"],
            download_naming: DownloadNaming::Timestamped,
        }
    }

    pub fn enhanced_thumbnails() -> Self {
        Self {
            slug: "enhanced-thumbnails",
            title: "Enhanced Thumbnails",
            description: "Create professional thumbnails with Higher Quality",
            accept: AcceptPolicy::image(),
            missing_file_message: "Please upload an image first.",
            upload: None,
            generate: GenerateEndpoint {
                path: "/enhanced-thumbnail",
                encoding: Encoding::Multipart,
                file_field: Some("image"),
                failure_message: "Failed to enhance image",
            },
            params: ParamSchema::default(),
            result_field: "enhancedImageUrl",
            result_kind: ResultKind::Media,
            analysis_fields: vec!["analysis"],
            download_naming: DownloadNaming::EnhancedSource,
        }
    }

    pub fn generate_subtitles() -> Self {
        Self {
            slug: "generate-subtitles",
            title: "Generate Subtitles",
            description: "Add accurate, well-timed subtitles to your videos",
            accept: AcceptPolicy::video(),
            missing_file_message: "Please upload a video first.",
            upload: Some(video_upload()),
            generate: GenerateEndpoint {
                path: "/generate-subtitles",
                encoding: Encoding::Json,
                file_field: None,
                failure_message: "Failed to generate subtitles",
            },
            params: ParamSchema::default(),
            result_field: "subtitleUrl",
            result_kind: ResultKind::Media,
            analysis_fields: vec![],
            download_naming: DownloadNaming::UrlSegment,
        }
    }

    pub fn hashtag_generator() -> Self {
        Self {
            slug: "hashtag-generator",
            title: "Hashtag Generator",
            description: "Generate high-trending hashtags for YouTube, TikTok, and Instagram",
            accept: AcceptPolicy::subtitle(),
            missing_file_message: "Please upload a subtitle file.",
            upload: None,
            generate: GenerateEndpoint {
                path: "/generate-hashtags",
                encoding: Encoding::Multipart,
                file_field: Some("subtitle"),
                failure_message: "Failed to generate hashtags",
            },
            params: ParamSchema::default()
                .count("hashtagCount", "Number of hashtags (5-30)", 5, 30, 15)
                .with_platforms(Platform::ALL.to_vec()),
            result_field: "hashtags",
            result_kind: ResultKind::Hashtags,
            analysis_fields: vec!["analysis"],
            download_naming: DownloadNaming::UrlSegment,
        }
    }

    /// Local file name for artifact `index` of a result generated from `source_name`.
    pub fn download_name(&self, artifact: &Artifact, index: usize, source_name: &str) -> String {
        let url_segment = || {
            artifact
                .url
                .as_deref()
                .and_then(|u| u.split(['?', '#']).next())
                .and_then(|u| u.rsplit('/').next())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let raw = match self.download_naming {
            DownloadNaming::EnhancedSource => format!("enhanced-{source_name}"),
            DownloadNaming::Timestamped => match &artifact.timestamp {
                Some(ts) => format!("Thumbnail-{ts}.jpg"),
                None => format!("Thumbnail-{}.jpg", index + 1),
            },
            DownloadNaming::Numbered { prefix, ext } => format!("{prefix}_{}.{ext}", index + 1),
            DownloadNaming::UrlSegment => url_segment().unwrap_or_else(|| format!("{}-{}", self.slug, index + 1)),
        };
        let clean = sanitize_filename::sanitize_with_options(
            &raw,
            sanitize_filename::Options {
                replacement: "_",
                ..Default::default()
            },
        );
        if clean.is_empty() {
            format!("{}-{}", self.slug, index + 1)
        } else {
            clean
        }
    }
}

/// The dashboard, in display order.
pub fn catalog() -> Vec<FeatureSpec> {
    vec![
        FeatureSpec::generate_shorts(),
        FeatureSpec::viral_reels(),
        FeatureSpec::exciting_thumbnails(),
        FeatureSpec::enhanced_thumbnails(),
        FeatureSpec::generate_subtitles(),
        FeatureSpec::hashtag_generator(),
    ]
}

pub fn find(slug: &str) -> Option<FeatureSpec> {
    catalog().into_iter().find(|f| f.slug == slug)
}

/// A feature as listed to the view, with the filter for its file picker.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub feature: FeatureSpec,
    pub accept_attr: String,
}

impl From<FeatureSpec> for CatalogEntry {
    fn from(feature: FeatureSpec) -> Self {
        let accept_attr = feature.accept.accept_attr();
        Self { feature, accept_attr }
    }
}
