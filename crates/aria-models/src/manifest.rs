//! Required asset sets per back-end.
//!
//! All fields are known at compile time; the probe is a plain existence
//! check over the file list. A back-end is installable exactly when every
//! file in its manifest exists in the asset directory.

use std::path::{Path, PathBuf};

use aria_core::backend::BackendKind;

/// One required asset file.
#[derive(Clone, Copy, Debug)]
pub struct AssetFile {
    /// On-disk file name.
    pub name: &'static str,
    /// Source URL for the fetcher.
    pub url: &'static str,
}

/// The complete asset manifest for one back-end.
#[derive(Clone, Copy, Debug)]
pub struct BackendAssets {
    /// Owning back-end.
    pub backend: BackendKind,
    /// Version string recorded in track metadata and the content hash.
    pub model_version: &'static str,
    /// Required files.
    pub files: &'static [AssetFile],
}

/// MusicGen-small ONNX export: T5 text encoder, first-step/with-past
/// decoder pair, EnCodec decoder, tokenizer.
pub const MUSICGEN_ASSETS: BackendAssets = BackendAssets {
    backend: BackendKind::MusicGen,
    model_version: "musicgen-small-onnx-1.0",
    files: &[
        AssetFile {
            name: "text_encoder.onnx",
            url: "https://huggingface.co/xenova/musicgen-small/resolve/main/onnx/text_encoder.onnx",
        },
        AssetFile {
            name: "decoder_model.onnx",
            url: "https://huggingface.co/xenova/musicgen-small/resolve/main/onnx/decoder_model.onnx",
        },
        AssetFile {
            name: "decoder_with_past_model.onnx",
            url: "https://huggingface.co/xenova/musicgen-small/resolve/main/onnx/decoder_with_past_model.onnx",
        },
        AssetFile {
            name: "encodec_decode.onnx",
            url: "https://huggingface.co/xenova/musicgen-small/resolve/main/onnx/encodec_decode.onnx",
        },
        AssetFile {
            name: "tokenizer.json",
            url: "https://huggingface.co/xenova/musicgen-small/resolve/main/tokenizer.json",
        },
    ],
};

/// ACE-Step ONNX export: UMT5 encoder, diffusion transformer, latent
/// decoder, vocoder, tokenizer.
pub const ACE_STEP_ASSETS: BackendAssets = BackendAssets {
    backend: BackendKind::AceStep,
    model_version: "ace-step-onnx-1.0",
    files: &[
        AssetFile {
            name: "umt5_encoder.onnx",
            url: "https://huggingface.co/ACE-Step/ACE-Step-v1-onnx/resolve/main/onnx/umt5_encoder.onnx",
        },
        AssetFile {
            name: "denoiser.onnx",
            url: "https://huggingface.co/ACE-Step/ACE-Step-v1-onnx/resolve/main/onnx/denoiser.onnx",
        },
        AssetFile {
            name: "latent_decoder.onnx",
            url: "https://huggingface.co/ACE-Step/ACE-Step-v1-onnx/resolve/main/onnx/latent_decoder.onnx",
        },
        AssetFile {
            name: "vocoder.onnx",
            url: "https://huggingface.co/ACE-Step/ACE-Step-v1-onnx/resolve/main/onnx/vocoder.onnx",
        },
        AssetFile {
            name: "tokenizer.json",
            url: "https://huggingface.co/ACE-Step/ACE-Step-v1-onnx/resolve/main/tokenizer.json",
        },
    ],
};

/// Manifest for a back-end.
pub fn assets_for(backend: BackendKind) -> &'static BackendAssets {
    match backend {
        BackendKind::MusicGen => &MUSICGEN_ASSETS,
        BackendKind::AceStep => &ACE_STEP_ASSETS,
    }
}

impl BackendAssets {
    /// Path of one asset under `dir`.
    pub fn path_of(&self, dir: &Path, name: &str) -> PathBuf {
        dir.join(name)
    }

    /// Files from the manifest missing under `dir`.
    pub fn missing_files(&self, dir: &Path) -> Vec<&'static AssetFile> {
        self.files
            .iter()
            .filter(|f| !dir.join(f.name).exists())
            .collect()
    }

    /// Whether every required file exists under `dir`.
    pub fn all_exist(&self, dir: &Path) -> bool {
        self.missing_files(dir).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifests_cover_both_backends() {
        assert_eq!(assets_for(BackendKind::MusicGen).backend, BackendKind::MusicGen);
        assert_eq!(assets_for(BackendKind::AceStep).backend, BackendKind::AceStep);
    }

    #[test]
    fn musicgen_file_set() {
        let names: Vec<&str> = MUSICGEN_ASSETS.files.iter().map(|f| f.name).collect();
        assert!(names.contains(&"text_encoder.onnx"));
        assert!(names.contains(&"decoder_model.onnx"));
        assert!(names.contains(&"decoder_with_past_model.onnx"));
        assert!(names.contains(&"encodec_decode.onnx"));
        assert!(names.contains(&"tokenizer.json"));
    }

    #[test]
    fn ace_step_file_set() {
        let names: Vec<&str> = ACE_STEP_ASSETS.files.iter().map(|f| f.name).collect();
        assert_eq!(names.len(), 5);
        assert!(names.contains(&"denoiser.onnx"));
        assert!(names.contains(&"vocoder.onnx"));
    }

    #[test]
    fn all_exist_empty_dir() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(!MUSICGEN_ASSETS.all_exist(tmp.path()));
        assert_eq!(MUSICGEN_ASSETS.missing_files(tmp.path()).len(), MUSICGEN_ASSETS.files.len());
    }

    #[test]
    fn all_exist_partial_and_complete() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("tokenizer.json"), b"{}").unwrap();
        assert!(!ACE_STEP_ASSETS.all_exist(tmp.path()));

        for f in ACE_STEP_ASSETS.files {
            std::fs::write(tmp.path().join(f.name), b"").unwrap();
        }
        assert!(ACE_STEP_ASSETS.all_exist(tmp.path()));
    }

    #[test]
    fn urls_are_absolute_and_end_with_name() {
        for manifest in [&MUSICGEN_ASSETS, &ACE_STEP_ASSETS] {
            for f in manifest.files {
                assert!(f.url.starts_with("https://"), "{}", f.url);
                assert!(f.url.ends_with(f.name), "{} vs {}", f.url, f.name);
            }
        }
    }

    #[test]
    fn path_of_joins_dir() {
        let p = MUSICGEN_ASSETS.path_of(Path::new("/models"), "tokenizer.json");
        assert_eq!(p, PathBuf::from("/models/tokenizer.json"));
    }
}
