use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::io::Cursor;
use std::time::Duration;
use tracing::debug;

use crate::error::TranscriptionError;
use crate::voice::Transcriber;

/// Anything shorter is a click or a breath, not a command.
const MIN_AUDIO_SECS: f32 = 0.3;

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// Sends each segment as a WAV body to a speech-to-text server.
#[derive(Clone)]
pub struct HttpTranscriber {
    client: Client,
    url: String,
}

impl HttpTranscriber {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, TranscriptionError> {
        Ok(Self {
            client: Client::builder().timeout(request_timeout).build()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, samples: &[i16], sample_rate: u32) -> Result<String, TranscriptionError> {
        if sample_rate == 0 || (samples.len() as f32 / sample_rate as f32) < MIN_AUDIO_SECS {
            return Ok(String::new());
        }

        let body = encode_wav(samples, sample_rate)?;
        debug!(bytes = body.len(), "Sending audio for transcription");
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "audio/wav")
            .body(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TranscriptionError::Status(response.status()));
        }
        let parsed: TranscriptionResponse = response.json().await?;
        Ok(parsed.text.trim().to_string())
    }
}

/// 16-bit mono PCM WAV, in memory.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
