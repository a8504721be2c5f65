//! Multichannel impulse response storage.
//!
//! An [`ImpulseStore`] holds one impulse response per channel. Channels are
//! either owned (heap-backed, resizable) or referenced (caller-owned slices,
//! read-only). Engines only read the store while configuring, so a referenced
//! store can point straight at decoded file data without copying it.

use std::borrow::Cow;

use crate::Sample;

/// Default sample rate recorded on new stores.
pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;

/// Per-channel impulse response samples.
///
/// # Modes
///
/// - **Owned**: created by [`new`](Self::new), [`from_channels`](Self::from_channels),
///   [`set_length`](Self::set_length) or [`set_num_channels`](Self::set_num_channels).
///   Every channel has the same length.
/// - **Referenced**: created by [`set_referenced`](Self::set_referenced). Channels borrow
///   caller memory; any mutating call copies them into owned storage first.
///
/// # Example
///
/// ```rust
/// use convolvo_core::ImpulseStore;
///
/// let mut impulse = ImpulseStore::new();
/// impulse.set_length(4);
/// impulse.channel_mut(0).copy_from_slice(&[1.0, 0.5, 0.25, 0.125]);
/// impulse.set_num_channels(2, true);
///
/// assert_eq!(impulse.num_channels(), 2);
/// assert_eq!(impulse.channel(1), &[1.0, 0.5, 0.25, 0.125]);
/// ```
#[derive(Debug, Clone)]
pub struct ImpulseStore<'a> {
    channels: Vec<Cow<'a, [Sample]>>,
    referenced: bool,
    sample_rate: f64,
}

impl ImpulseStore<'_> {
    /// Creates a store with a single empty owned channel.
    pub fn new() -> Self {
        Self {
            channels: vec![Cow::Owned(Vec::new())],
            referenced: false,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    /// Creates an owned store from per-channel sample vectors.
    ///
    /// Shorter channels are zero-padded to the length of the longest one.
    pub fn from_channels(channels: Vec<Vec<Sample>>) -> Self {
        let length = channels.iter().map(Vec::len).max().unwrap_or(0);
        let channels = channels
            .into_iter()
            .map(|mut samples| {
                samples.resize(length, 0.0);
                Cow::Owned(samples)
            })
            .collect();

        Self {
            channels,
            referenced: false,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    /// Creates a single-channel owned store.
    pub fn mono(samples: Vec<Sample>) -> Self {
        Self::from_channels(vec![samples])
    }
}

impl Default for ImpulseStore<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> ImpulseStore<'a> {
    /// Returns the impulse length in samples (per channel).
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, |c| c.len())
    }

    /// Returns `true` if the impulse has no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of channels.
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Returns `true` while channels borrow caller memory.
    pub fn is_referenced(&self) -> bool {
        self.referenced
    }

    /// Sample rate the impulse was recorded at. Engines do not interpret it.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Sets the recorded sample rate.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    /// Resizes every channel to `samples`, zero-filling new space.
    ///
    /// A referenced store is copied into owned storage first. Returns the
    /// length actually set.
    pub fn set_length(&mut self, samples: usize) -> usize {
        for channel in &mut self.channels {
            channel.to_mut().resize(samples, 0.0);
        }
        self.referenced = false;
        self.len()
    }

    /// Changes the channel count.
    ///
    /// Growing with `duplicate_existing` cycles copies of the existing channels
    /// (a mono impulse becomes identical left/right); otherwise new channels are
    /// silent. Shrinking drops the trailing channels.
    pub fn set_num_channels(&mut self, channels: usize, duplicate_existing: bool) {
        let old = self.channels.len();
        if channels <= old {
            self.channels.truncate(channels);
        } else {
            let length = self.len();
            for ch in old..channels {
                let samples = if duplicate_existing && old > 0 {
                    self.channels[ch % old].to_vec()
                } else {
                    vec![0.0; length]
                };
                self.channels.push(Cow::Owned(samples));
            }
        }

        // Any remaining borrowed channels become owned so the store has one mode.
        if self.referenced {
            for channel in &mut self.channels {
                channel.to_mut();
            }
            self.referenced = false;
        }
    }

    /// Points the store at caller-owned channel data without copying.
    ///
    /// Only the first `samples` samples of each slice are used; slices shorter
    /// than that are clamped to their own length, and the store length becomes
    /// the shortest of them so every channel stays equally long.
    pub fn set_referenced(&mut self, channels: &[&'a [Sample]], samples: usize) {
        let length = channels
            .iter()
            .map(|c| c.len().min(samples))
            .min()
            .unwrap_or(0);

        self.channels = channels.iter().map(|c| Cow::Borrowed(&c[..length])).collect();
        self.referenced = true;
    }

    /// Returns the samples of channel `index`.
    ///
    /// An out-of-range index falls back to channel 0 rather than panicking,
    /// and an empty store yields an empty slice.
    pub fn channel(&self, index: usize) -> &[Sample] {
        debug_assert!(
            index < self.channels.len(),
            "impulse channel {index} out of range"
        );
        self.channels
            .get(index)
            .or_else(|| self.channels.first())
            .map_or(&[][..], |c| &**c)
    }

    /// Returns mutable access to channel `index` (clamped like [`channel`](Self::channel)).
    ///
    /// Borrowed data is copied into owned storage first.
    ///
    /// # Panics
    ///
    /// Panics if the store has no channels.
    pub fn channel_mut(&mut self, index: usize) -> &mut [Sample] {
        assert!(!self.channels.is_empty(), "impulse store has no channels");
        if self.referenced {
            for channel in &mut self.channels {
                channel.to_mut();
            }
            self.referenced = false;
        }
        let index = if index < self.channels.len() { index } else { 0 };
        self.channels[index].to_mut().as_mut_slice()
    }

    /// Copies the store into one that owns all of its data.
    pub fn into_owned(self) -> ImpulseStore<'static> {
        ImpulseStore {
            channels: self
                .channels
                .into_iter()
                .map(|c| Cow::Owned(c.into_owned()))
                .collect(),
            referenced: false,
            sample_rate: self.sample_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_store_has_one_empty_channel() {
        let store = ImpulseStore::new();
        assert_eq!(store.num_channels(), 1);
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert!(!store.is_referenced());
        assert_eq!(store.sample_rate(), DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn from_channels_pads_to_longest() {
        let store = ImpulseStore::from_channels(vec![vec![1.0, 2.0, 3.0], vec![4.0]]);
        assert_eq!(store.len(), 3);
        assert_eq!(store.channel(1), &[4.0, 0.0, 0.0]);
    }

    #[test]
    fn set_length_resizes_all_channels() {
        let mut store = ImpulseStore::from_channels(vec![vec![1.0; 8], vec![2.0; 8]]);
        assert_eq!(store.set_length(4), 4);
        assert_eq!(store.channel(0).len(), 4);
        assert_eq!(store.channel(1).len(), 4);

        assert_eq!(store.set_length(6), 6);
        assert_eq!(store.channel(1), &[2.0, 2.0, 2.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn set_num_channels_duplicates_cyclically() {
        let mut store = ImpulseStore::from_channels(vec![vec![1.0, 1.0], vec![2.0, 2.0]]);
        store.set_num_channels(5, true);
        assert_eq!(store.num_channels(), 5);
        assert_eq!(store.channel(2), &[1.0, 1.0]);
        assert_eq!(store.channel(3), &[2.0, 2.0]);
        assert_eq!(store.channel(4), &[1.0, 1.0]);
    }

    #[test]
    fn set_num_channels_without_duplication_adds_silence() {
        let mut store = ImpulseStore::mono(vec![1.0, 0.5]);
        store.set_num_channels(2, false);
        assert_eq!(store.channel(1), &[0.0, 0.0]);

        store.set_num_channels(1, false);
        assert_eq!(store.num_channels(), 1);
    }

    #[test]
    fn referenced_store_borrows_and_copies_on_write() {
        let left = [1.0, 2.0, 3.0, 4.0];
        let right = [5.0, 6.0, 7.0];
        let mut store = ImpulseStore::new();
        store.set_referenced(&[&left, &right], 4);

        assert!(store.is_referenced());
        assert_eq!(store.len(), 3);
        assert_eq!(store.channel(0), &[1.0, 2.0, 3.0]);

        store.channel_mut(1)[0] = -1.0;
        assert!(!store.is_referenced());
        assert_eq!(store.channel(1), &[-1.0, 6.0, 7.0]);
        assert_eq!(right[0], 5.0);
    }

    #[test]
    fn set_length_on_referenced_store_switches_to_owned() {
        let data = [1.0, 2.0];
        let mut store = ImpulseStore::new();
        store.set_referenced(&[&data], 2);
        store.set_length(3);
        assert!(!store.is_referenced());
        assert_eq!(store.channel(0), &[1.0, 2.0, 0.0]);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn out_of_range_channel_falls_back_to_first() {
        let store = ImpulseStore::from_channels(vec![vec![1.0], vec![2.0]]);
        assert_eq!(store.channel(7), &[1.0]);
    }

    #[test]
    fn into_owned_detaches_from_borrowed_data() {
        let data = vec![0.25; 16];
        let owned = {
            let mut store = ImpulseStore::new();
            store.set_referenced(&[&data], 16);
            store.into_owned()
        };
        drop(data);
        assert_eq!(owned.len(), 16);
        assert!(!owned.is_referenced());
    }
}
