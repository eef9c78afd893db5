//! Network-adaptive bitrate control.
//!
//! Reacts to coarse path-quality notifications from the host OS by
//! retuning the external encoder's target bitrate. The loop is advisory
//! and lossy: it never touches the media path, and when adaptive mode is
//! off notifications are ignored entirely. There is no hysteresis beyond
//! the clamp — under sustained signals of one kind the target converges
//! monotonically to the band edge.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};

/// Multiplier applied on a satisfied, unconstrained path.
const RAMP_UP_FACTOR: f64 = 1.3;
/// Multiplier applied on a satisfied but constrained path.
const RAMP_DOWN_FACTOR: f64 = 0.7;
/// Multiplier applied when the path is unsatisfied.
const CUT_FACTOR: f64 = 0.5;

/// Coarse network-path quality, as delivered by the OS path monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkQuality {
    /// Path is usable with headroom; ramp the encoder up.
    SatisfiedUnconstrained,
    /// Path is usable but constrained (e.g. expensive or metered); back off.
    SatisfiedConstrained,
    /// Path is degraded or unreachable; cut hard.
    Unsatisfied,
}

/// Control surface of the external hardware encoder.
///
/// The server owns the registration; the encoder side holds no reference
/// back, so there is no cycle to break on shutdown.
pub trait EncoderControl: Send + Sync {
    /// Retune the encoder's target bitrate, in bits per second.
    /// May be called from any thread, at any time while attached.
    fn set_target_bitrate(&self, bps: u32);
}

/// Closed-loop bitrate adapter: quality signal in, clamped target out.
pub struct BitrateController {
    current: Mutex<u32>,
    min: u32,
    max: u32,
    enabled: AtomicBool,
    encoder: RwLock<Option<Arc<dyn EncoderControl>>>,
}

impl BitrateController {
    /// Create with an initial target and a `[min, max]` band. The initial
    /// value is clamped into the band.
    pub fn new(initial: u32, min: u32, max: u32, enabled: bool) -> Self {
        Self {
            current: Mutex::new(initial.clamp(min, max)),
            min,
            max,
            enabled: AtomicBool::new(enabled),
            encoder: RwLock::new(None),
        }
    }

    /// Attach the encoder handle and push the current target to it.
    pub fn attach_encoder(&self, encoder: Arc<dyn EncoderControl>) {
        encoder.set_target_bitrate(*self.current.lock());
        *self.encoder.write() = Some(encoder);
    }

    /// Drop the encoder handle (server shutdown). Subsequent notifications
    /// still adjust the internal target but reach no encoder.
    pub fn detach_encoder(&self) {
        *self.encoder.write() = None;
    }

    /// Enable or disable adaptation at runtime.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Current target bitrate in bits per second.
    pub fn current_bitrate(&self) -> u32 {
        *self.current.lock()
    }

    /// Apply one quality notification: scale, clamp, push to the encoder.
    pub fn on_network_quality(&self, quality: NetworkQuality) {
        if !self.is_enabled() {
            tracing::trace!(?quality, "adaptive bitrate disabled, ignoring");
            return;
        }

        let factor = match quality {
            NetworkQuality::SatisfiedUnconstrained => RAMP_UP_FACTOR,
            NetworkQuality::SatisfiedConstrained => RAMP_DOWN_FACTOR,
            NetworkQuality::Unsatisfied => CUT_FACTOR,
        };

        let target = {
            let mut current = self.current.lock();
            let scaled = (*current as f64 * factor).round() as u32;
            *current = scaled.clamp(self.min, self.max);
            *current
        };

        tracing::debug!(?quality, target_bps = target, "bitrate retuned");

        if let Some(encoder) = self.encoder.read().as_ref() {
            encoder.set_target_bitrate(target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    /// Records every target pushed to it.
    struct RecordingEncoder {
        targets: PlMutex<Vec<u32>>,
    }

    impl RecordingEncoder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                targets: PlMutex::new(Vec::new()),
            })
        }

        fn last(&self) -> Option<u32> {
            self.targets.lock().last().copied()
        }
    }

    impl EncoderControl for RecordingEncoder {
        fn set_target_bitrate(&self, bps: u32) {
            self.targets.lock().push(bps);
        }
    }

    fn controller() -> BitrateController {
        BitrateController::new(2_000_000, 300_000, 8_000_000, true)
    }

    #[test]
    fn attach_pushes_initial_target() {
        let ctrl = controller();
        let enc = RecordingEncoder::new();
        ctrl.attach_encoder(enc.clone());
        assert_eq!(enc.last(), Some(2_000_000));
    }

    #[test]
    fn unconstrained_ramps_up() {
        let ctrl = controller();
        ctrl.on_network_quality(NetworkQuality::SatisfiedUnconstrained);
        assert_eq!(ctrl.current_bitrate(), 2_600_000);
    }

    #[test]
    fn constrained_backs_off() {
        let ctrl = controller();
        ctrl.on_network_quality(NetworkQuality::SatisfiedConstrained);
        assert_eq!(ctrl.current_bitrate(), 1_400_000);
    }

    #[test]
    fn unsatisfied_cuts_in_half() {
        let ctrl = controller();
        ctrl.on_network_quality(NetworkQuality::Unsatisfied);
        assert_eq!(ctrl.current_bitrate(), 1_000_000);
    }

    #[test]
    fn sustained_good_signal_converges_to_max() {
        let ctrl = controller();
        let enc = RecordingEncoder::new();
        ctrl.attach_encoder(enc.clone());

        let mut previous = ctrl.current_bitrate();
        for _ in 0..20 {
            ctrl.on_network_quality(NetworkQuality::SatisfiedUnconstrained);
            let now = ctrl.current_bitrate();
            assert!(now >= previous, "monotonic toward the band edge");
            previous = now;
        }
        assert_eq!(ctrl.current_bitrate(), 8_000_000);
        assert_eq!(enc.last(), Some(8_000_000));
    }

    #[test]
    fn sustained_bad_signal_converges_to_min() {
        let ctrl = controller();
        for _ in 0..20 {
            ctrl.on_network_quality(NetworkQuality::Unsatisfied);
        }
        assert_eq!(ctrl.current_bitrate(), 300_000);
    }

    #[test]
    fn disabled_ignores_notifications() {
        let ctrl = BitrateController::new(2_000_000, 300_000, 8_000_000, false);
        let enc = RecordingEncoder::new();
        ctrl.attach_encoder(enc.clone());

        ctrl.on_network_quality(NetworkQuality::Unsatisfied);
        assert_eq!(ctrl.current_bitrate(), 2_000_000);
        assert_eq!(enc.targets.lock().len(), 1, "only the attach push");
    }

    #[test]
    fn initial_value_clamped_into_band() {
        let ctrl = BitrateController::new(50_000_000, 300_000, 8_000_000, true);
        assert_eq!(ctrl.current_bitrate(), 8_000_000);
    }

    #[test]
    fn detached_encoder_no_longer_receives() {
        let ctrl = controller();
        let enc = RecordingEncoder::new();
        ctrl.attach_encoder(enc.clone());
        ctrl.detach_encoder();
        ctrl.on_network_quality(NetworkQuality::SatisfiedConstrained);
        assert_eq!(enc.targets.lock().len(), 1);
    }
}
