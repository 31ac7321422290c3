//! Audio playback for module clips
//!
//! rodio wrapper over the module's declared music and sound pools. At
//! most one music track is live at a time; `loop_music` and
//! `play_music_once` replace it, `stop_music` drops it. Sounds are
//! fire-and-forget one-shots. The Quit path pauses music rather than
//! stopping it so a restart resumes where it left off.
//!
//! A missing output device degrades to a silent player instead of
//! failing the bridge; every command becomes a no-op.

use std::io::Cursor;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use rodio::source::Source;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use tracing::warn;

use crate::wasm::AudioCommand;

type ClipBytes = Arc<[u8]>;

pub struct AudioPlayer {
    /// Keeps the device stream alive; `None` when no output exists.
    output: Option<(OutputStream, OutputStreamHandle)>,
    music: Vec<Option<ClipBytes>>,
    sounds: Vec<Option<ClipBytes>>,
    music_sink: Option<Sink>,
    master_volume: f32,
}

impl AudioPlayer {
    /// Create a player with slots for the module's declared clip counts.
    pub fn new(music_count: u32, sound_count: u32, master_volume: f32) -> Self {
        let output = match OutputStream::try_default() {
            Ok(pair) => Some(pair),
            Err(e) => {
                warn!(error = %e, "no audio output available, running silent");
                None
            }
        };
        Self {
            output,
            music: vec![None; music_count as usize],
            sounds: vec![None; sound_count as usize],
            music_sink: None,
            master_volume,
        }
    }

    /// Store a loaded music clip, verifying it decodes.
    pub fn insert_music(&mut self, id: u32, bytes: Vec<u8>) -> Result<()> {
        let slot = self
            .music
            .get_mut(id as usize)
            .with_context(|| format!("music id {id} out of range"))?;
        let clip: ClipBytes = bytes.into();
        Decoder::new(Cursor::new(clip.clone()))
            .with_context(|| format!("music {id} does not decode"))?;
        *slot = Some(clip);
        Ok(())
    }

    /// Store a loaded sound clip, verifying it decodes.
    pub fn insert_sound(&mut self, id: u32, bytes: Vec<u8>) -> Result<()> {
        let slot = self
            .sounds
            .get_mut(id as usize)
            .with_context(|| format!("sound id {id} out of range"))?;
        let clip: ClipBytes = bytes.into();
        Decoder::new(Cursor::new(clip.clone()))
            .with_context(|| format!("sound {id} does not decode"))?;
        *slot = Some(clip);
        Ok(())
    }

    /// Execute one recorded command. Out-of-range ids are a module
    /// programming error: logged and ignored, never fatal.
    pub fn handle(&mut self, command: AudioCommand) {
        match command {
            AudioCommand::LoopMusic(id) => self.start_music(id, true),
            AudioCommand::PlayMusicOnce(id) => self.start_music(id, false),
            AudioCommand::StopMusic => self.stop_music(),
            AudioCommand::PlaySound(id) => self.play_sound(id),
        }
    }

    fn clip(pool: &[Option<ClipBytes>], kind: &str, id: u32) -> Option<ClipBytes> {
        match pool.get(id as usize) {
            Some(Some(clip)) => Some(clip.clone()),
            _ => {
                warn!(kind, id, "clip id out of range or not loaded, ignoring");
                None
            }
        }
    }

    fn start_music(&mut self, id: u32, looped: bool) {
        let Some(clip) = Self::clip(&self.music, "music", id) else {
            return;
        };
        let Some((_, handle)) = &self.output else {
            return;
        };
        let handle = handle.clone();
        self.stop_music();
        let sink = match Sink::try_new(&handle) {
            Ok(sink) => sink,
            Err(e) => {
                warn!(error = %e, "failed to open music sink");
                return;
            }
        };
        let decoder = match Decoder::new(Cursor::new(clip)) {
            Ok(decoder) => decoder,
            Err(e) => {
                warn!(id, error = %e, "music clip failed to decode at play time");
                return;
            }
        };
        sink.set_volume(self.master_volume);
        if looped {
            sink.append(decoder.repeat_infinite());
        } else {
            sink.append(decoder);
        }
        self.music_sink = Some(sink);
    }

    fn stop_music(&mut self) {
        if let Some(sink) = self.music_sink.take() {
            sink.stop();
        }
    }

    fn play_sound(&mut self, id: u32) {
        let Some(clip) = Self::clip(&self.sounds, "sound", id) else {
            return;
        };
        let Some((_, handle)) = &self.output else {
            return;
        };
        let decoder = match Decoder::new(Cursor::new(clip)) {
            Ok(decoder) => decoder,
            Err(e) => {
                warn!(id, error = %e, "sound clip failed to decode at play time");
                return;
            }
        };
        let source = decoder.convert_samples::<f32>().amplify(self.master_volume);
        if let Err(e) = handle.play_raw(source) {
            warn!(error = %e, "failed to play sound");
        }
    }

    /// Pause the music track if one is live. Used on Quit.
    pub fn pause_music(&mut self) {
        if let Some(sink) = &self.music_sink {
            sink.pause();
        }
    }

    /// Resume a paused music track. Used on restart.
    pub fn resume_music(&mut self) {
        if let Some(sink) = &self.music_sink {
            sink.play();
        }
    }

    /// Whether every declared clip has been loaded.
    pub fn fully_loaded(&self) -> bool {
        self.music.iter().all(Option::is_some) && self.sounds.iter().all(Option::is_some)
    }
}

/// Reject clips the module never declared.
pub fn validate_clip_id(id: u32, count: u32) -> Result<()> {
    if id < count {
        Ok(())
    } else {
        bail!("clip id {id} out of range (count {count})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_id_validation() {
        assert!(validate_clip_id(0, 1).is_ok());
        assert!(validate_clip_id(2, 3).is_ok());
        assert!(validate_clip_id(3, 3).is_err());
        assert!(validate_clip_id(0, 0).is_err());
    }

    #[test]
    fn insert_out_of_range_fails() {
        let mut player = AudioPlayer::new(1, 0, 1.0);
        assert!(player.insert_music(1, vec![0; 4]).is_err());
        assert!(player.insert_sound(0, vec![0; 4]).is_err());
    }

    #[test]
    fn insert_undecodable_clip_fails() {
        let mut player = AudioPlayer::new(1, 1, 1.0);
        assert!(player.insert_music(0, b"not audio".to_vec()).is_err());
        assert!(player.insert_sound(0, b"not audio".to_vec()).is_err());
        assert!(!player.fully_loaded());
    }

    #[test]
    fn commands_with_missing_clips_do_not_panic() {
        let mut player = AudioPlayer::new(1, 1, 1.0);
        player.handle(AudioCommand::LoopMusic(0));
        player.handle(AudioCommand::LoopMusic(99));
        player.handle(AudioCommand::PlayMusicOnce(0));
        player.handle(AudioCommand::PlaySound(7));
        player.handle(AudioCommand::StopMusic);
    }

    #[test]
    fn pause_resume_without_music_are_noops() {
        let mut player = AudioPlayer::new(0, 0, 0.5);
        player.pause_music();
        player.resume_music();
        assert!(player.fully_loaded());
    }

    #[test]
    fn zero_clip_module_is_fully_loaded() {
        let player = AudioPlayer::new(0, 0, 1.0);
        assert!(player.fully_loaded());
    }
}
