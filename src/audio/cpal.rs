// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{fmt, thread};

#[cfg(test)]
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use tracing::{error, info, span, Level};

use crate::audio::{ActiveSource, AudioMixer, DeviceError, SourceSender};
use crate::config;

/// The name that selects the host's default output device.
const DEFAULT_DEVICE: &str = "default";

/// Bounded queue between the trigger path and the audio callback.
const SOURCE_QUEUE_SIZE: usize = 256;

/// A cpal output device with a running output stream.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The output sample rate.
    sample_rate: u32,
    /// Number of output channels.
    channels: u16,
    /// Channel for adding sources without lock contention.
    source_tx: SourceSender,
    /// Dropping this stops the output thread and its stream.
    _shutdown_tx: Sender<()>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.channels,
            self.host_id.name()
        )
    }
}

impl Device {
    /// Lists output devices across every available host.
    pub fn list() -> Result<Vec<String>, DeviceError> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout().map_err(|e| DeviceError::Init(e.to_string()))?;
        let _shh_stderr = shh::stderr().map_err(|e| DeviceError::Init(e.to_string()))?;

        let mut devices = Vec::new();
        for host_id in cpal::available_hosts() {
            let host = match cpal::host_from_id(host_id) {
                Ok(host) => host,
                Err(e) => {
                    error!(err = e.to_string(), host = host_id.name(), "Host unavailable");
                    continue;
                }
            };
            let host_devices = match host.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let max_channels = match device.supported_output_configs() {
                    Ok(configs) => configs.map(|c| c.channels()).max().unwrap_or(0),
                    Err(_) => continue,
                };
                if max_channels == 0 {
                    continue;
                }
                let name = match device.name() {
                    Ok(name) => name,
                    Err(_) => continue,
                };
                devices.push(format!(
                    "{} (Channels={}) ({})",
                    name,
                    max_channels,
                    host_id.name()
                ));
            }
        }

        Ok(devices)
    }

    /// Opens the configured device and starts its output stream. A failure here is
    /// the one fatal-class audio error: callers should disable audio, not retry.
    pub fn get(config: &config::Audio) -> Result<Device, DeviceError> {
        let (host_id, device) = Device::find(config.device())?;
        let name = device
            .name()
            .unwrap_or_else(|_| config.device().to_string());

        let sample_rate = config.sample_rate();
        let channels = config.channels();
        let mixer = AudioMixer::new(channels, sample_rate);
        let (source_tx, source_rx) = crossbeam_channel::bounded(SOURCE_QUEUE_SIZE);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), DeviceError>>(1);

        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate,
            buffer_size: match config.buffer_size() {
                Some(frames) => cpal::BufferSize::Fixed(frames),
                None => cpal::BufferSize::Default,
            },
        };

        // cpal streams aren't Send on every platform, so the stream lives and dies
        // on its own thread.
        let thread_name = name.clone();
        thread::spawn(move || {
            let span = span!(Level::INFO, "audio output", device = thread_name);
            let _enter = span.enter();

            let stream = match Device::build_stream(&device, &stream_config, mixer, source_rx) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(DeviceError::Init(e.to_string())));
                return;
            }
            info!("Output stream started");
            let _ = ready_tx.send(Ok(()));

            // Blocks until the owning Device is dropped.
            let _ = shutdown_rx.recv();
            info!("Output stream stopped");
        });

        ready_rx
            .recv()
            .map_err(|_| DeviceError::Init("output thread exited".to_string()))??;

        Ok(Device {
            name,
            host_id,
            sample_rate,
            channels,
            source_tx,
            _shutdown_tx: shutdown_tx,
        })
    }

    /// Finds a device by name, or the default host's default output.
    fn find(name: &str) -> Result<(cpal::HostId, cpal::Device), DeviceError> {
        if name == DEFAULT_DEVICE {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| DeviceError::NotFound(name.to_string()))?;
            return Ok((host.id(), device));
        }

        for host_id in cpal::available_hosts() {
            let Ok(host) = cpal::host_from_id(host_id) else {
                continue;
            };
            let Ok(devices) = host.output_devices() else {
                continue;
            };
            for device in devices {
                if device.name().map(|n| n == name).unwrap_or(false) {
                    return Ok((host_id, device));
                }
            }
        }

        Err(DeviceError::NotFound(name.to_string()))
    }

    fn build_stream(
        device: &cpal::Device,
        stream_config: &cpal::StreamConfig,
        mixer: AudioMixer,
        source_rx: Receiver<ActiveSource>,
    ) -> Result<cpal::Stream, DeviceError> {
        let sample_format = device
            .default_output_config()
            .map_err(|e| DeviceError::Init(e.to_string()))?
            .sample_format();

        match sample_format {
            cpal::SampleFormat::I16 => {
                Device::build_typed_stream::<i16>(device, stream_config, mixer, source_rx)
            }
            cpal::SampleFormat::I32 => {
                Device::build_typed_stream::<i32>(device, stream_config, mixer, source_rx)
            }
            _ => Device::build_typed_stream::<f32>(device, stream_config, mixer, source_rx),
        }
    }

    fn build_typed_stream<T>(
        device: &cpal::Device,
        stream_config: &cpal::StreamConfig,
        mixer: AudioMixer,
        source_rx: Receiver<ActiveSource>,
    ) -> Result<cpal::Stream, DeviceError>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let channels = stream_config.channels as usize;
        // Grown once to the largest callback size, then reused.
        let mut scratch: Vec<f32> = Vec::new();

        device
            .build_output_stream(
                stream_config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    while let Ok(source) = source_rx.try_recv() {
                        mixer.add_source(source);
                    }

                    if scratch.len() < data.len() {
                        scratch.resize(data.len(), 0.0);
                    }
                    let scratch = &mut scratch[..data.len()];
                    mixer.process_into_output(scratch, data.len() / channels);
                    for (out, sample) in data.iter_mut().zip(scratch.iter()) {
                        *out = T::from_sample(sample.clamp(-1.0, 1.0));
                    }
                },
                |err| error!("CPAL output stream error: {}", err),
                None,
            )
            .map_err(|e| DeviceError::Init(e.to_string()))
    }
}

impl crate::audio::Device for Device {
    fn play(&self, source: ActiveSource) -> Result<(), DeviceError> {
        self.source_tx.try_send(source).map_err(|e| match e {
            crossbeam_channel::TrySendError::Full(_) => DeviceError::Overloaded(self.name.clone()),
            crossbeam_channel::TrySendError::Disconnected(_) => {
                DeviceError::Closed(self.name.clone())
            }
        })
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<crate::audio::mock::Device>, DeviceError> {
        Err(DeviceError::Init(format!("{} is not a mock device", self)))
    }
}
