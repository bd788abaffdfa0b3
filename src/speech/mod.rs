//! Speech
//!
//! Opaque speech-to-text and text-to-speech provider calls for the voice
//! endpoints. Both sides go through OpenAI: Whisper for transcription and
//! the speech API for synthesis. Only the call-outs and error mapping live
//! here; no audio processing happens in-process.

use bytes::Bytes;
use reqwest::multipart::{Form, Part};

use crate::ai::providers::{build_client, classify_error_response, with_retry};
use crate::ai::AiError;
use crate::config::Settings;

/// Speech errors
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("speech provider error: {0}")]
    Provider(#[from] AiError),

    #[error("invalid audio payload: {0}")]
    InvalidAudio(String),
}

/// Synthesized audio plus its content type.
#[derive(Debug, Clone)]
pub struct SpeechAudio {
    pub bytes: Bytes,
    pub mime_type: &'static str,
}

/// Speech-to-text contract.
#[async_trait::async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe one audio clip. The result may be empty when the clip
    /// contains no speech; callers decide whether that is an error.
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String, SpeechError>;
}

/// Text-to-speech contract.
#[async_trait::async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SpeechAudio, SpeechError>;
}

/// File extension for the multipart upload, derived from the mime type.
fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" => "mp4",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/ogg" => "ogg",
        "audio/flac" => "flac",
        _ => "webm",
    }
}

/// Whisper transcription backend.
pub struct OpenAiWhisper {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for OpenAiWhisper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiWhisper")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiWhisper {
    pub fn from_settings(settings: &Settings) -> Result<Self, SpeechError> {
        let api_key = settings
            .openai_api_key
            .clone()
            .ok_or(AiError::MissingApiKey {
                key: "OPENAI_API_KEY",
            })?;

        Ok(Self {
            client: build_client(60).map_err(SpeechError::Provider)?,
            api_key,
            base_url: settings.openai_base_url.clone(),
            model: settings.whisper_model.clone(),
        })
    }

    async fn request(&self, audio: &[u8], mime_type: &str) -> Result<String, AiError> {
        let part = Part::bytes(audio.to_vec())
            .file_name(format!("audio.{}", extension_for(mime_type)))
            .mime_str(mime_type)
            .map_err(|e| AiError::MalformedResponse(e.to_string()))?;

        let form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", "en")
            .text("prompt", "This is a business coaching conversation.")
            .text("temperature", "0")
            .text("response_format", "text");

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(classify_error_response(response).await);
        }

        Ok(response.text().await?.trim().to_string())
    }
}

#[async_trait::async_trait]
impl SpeechToText for OpenAiWhisper {
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String, SpeechError> {
        if audio.is_empty() {
            return Err(SpeechError::InvalidAudio("empty audio payload".to_string()));
        }
        let text =
            with_retry("whisper transcription", || self.request(audio, mime_type)).await?;
        Ok(text)
    }
}

/// OpenAI speech synthesis backend.
pub struct OpenAiSpeech {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    voice: String,
}

impl std::fmt::Debug for OpenAiSpeech {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiSpeech")
            .field("model", &self.model)
            .field("voice", &self.voice)
            .finish_non_exhaustive()
    }
}

impl OpenAiSpeech {
    pub fn from_settings(settings: &Settings) -> Result<Self, SpeechError> {
        let api_key = settings
            .openai_api_key
            .clone()
            .ok_or(AiError::MissingApiKey {
                key: "OPENAI_API_KEY",
            })?;

        Ok(Self {
            client: build_client(60).map_err(SpeechError::Provider)?,
            api_key,
            base_url: settings.openai_base_url.clone(),
            model: settings.tts_model.clone(),
            voice: settings.tts_voice.clone(),
        })
    }

    async fn request(&self, text: &str) -> Result<Bytes, AiError> {
        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "input": text,
                "voice": self.voice,
                "response_format": "mp3",
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(classify_error_response(response).await);
        }

        Ok(response.bytes().await?)
    }
}

#[async_trait::async_trait]
impl TextToSpeech for OpenAiSpeech {
    async fn synthesize(&self, text: &str) -> Result<SpeechAudio, SpeechError> {
        let bytes = with_retry("speech synthesis", || self.request(text)).await?;
        Ok(SpeechAudio {
            bytes,
            mime_type: "audio/mpeg",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_mapping() {
        assert_eq!(extension_for("audio/mpeg"), "mp3");
        assert_eq!(extension_for("audio/wav"), "wav");
        assert_eq!(extension_for("audio/webm"), "webm");
        assert_eq!(extension_for("application/octet-stream"), "webm");
    }

    #[tokio::test]
    async fn test_empty_audio_is_rejected_before_upload() {
        let settings = Settings {
            openai_api_key: Some("sk-test".to_string()),
            ..Settings::default()
        };
        let whisper = OpenAiWhisper::from_settings(&settings).unwrap();
        let err = whisper.transcribe(&[], "audio/webm").await.unwrap_err();
        assert!(matches!(err, SpeechError::InvalidAudio(_)));
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let settings = Settings::default();
        assert!(OpenAiWhisper::from_settings(&settings).is_err());
        assert!(OpenAiSpeech::from_settings(&settings).is_err());
    }
}
