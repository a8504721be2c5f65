//! Real FFT wrapper and spectral helpers for partitioned convolution.

use std::fmt;
use std::sync::Arc;

use realfft::{ComplexToReal, FftError, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

use crate::{FftReal, ImpulseReal};

/// Number of complex bins produced by a real FFT of `size` points.
#[inline]
pub fn complex_size(size: usize) -> usize {
    size / 2 + 1
}

/// Real-input FFT processor of a fixed size.
///
/// Plans and scratch space are created once; [`forward`](Self::forward) and
/// [`inverse`](Self::inverse) do not allocate.
#[derive(Clone)]
pub struct Fft {
    size: usize,
    forward: Arc<dyn RealToComplex<FftReal>>,
    inverse: Arc<dyn ComplexToReal<FftReal>>,
    scratch: Vec<Complex<FftReal>>,
}

impl fmt::Debug for Fft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fft").field("size", &self.size).finish()
    }
}

impl Fft {
    /// Plans forward and inverse transforms of `size` real points.
    pub fn new(size: usize) -> Self {
        let mut planner = RealFftPlanner::<FftReal>::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch_len = forward
            .get_scratch_len()
            .max(inverse.get_scratch_len());

        Self {
            size,
            forward,
            inverse,
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        }
    }

    /// Transform size in real points.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of complex bins (DC to Nyquist).
    pub fn bins(&self) -> usize {
        complex_size(self.size)
    }

    /// Forward transform. `input` is used as scratch and left unspecified.
    pub fn forward(
        &mut self,
        input: &mut [FftReal],
        output: &mut [Complex<FftReal>],
    ) -> Result<(), FftError> {
        self.forward
            .process_with_scratch(input, output, &mut self.scratch)
    }

    /// Normalized inverse transform. `input` is used as scratch.
    ///
    /// The imaginary parts of the DC and Nyquist bins are forced to zero
    /// first; spectra of real signals have none.
    pub fn inverse(
        &mut self,
        input: &mut [Complex<FftReal>],
        output: &mut [FftReal],
    ) -> Result<(), FftError> {
        if let Some(dc) = input.first_mut() {
            dc.im = 0.0;
        }
        if let Some(nyquist) = input.last_mut() {
            nyquist.im = 0.0;
        }

        self.inverse
            .process_with_scratch(input, output, &mut self.scratch)?;

        let scale = 1.0 / self.size as FftReal;
        for sample in output.iter_mut() {
            *sample *= scale;
        }
        Ok(())
    }
}

/// `acc += a * b` over two spectra, bin by bin.
///
/// `b` holds stored impulse data, which may be kept at reduced precision.
#[inline]
pub fn multiply_accumulate(
    acc: &mut [Complex<FftReal>],
    a: &[Complex<FftReal>],
    b: &[Complex<ImpulseReal>],
) {
    debug_assert_eq!(acc.len(), a.len());
    debug_assert_eq!(acc.len(), b.len());

    for ((out, x), h) in acc.iter_mut().zip(a).zip(b) {
        let (hr, hi) = (FftReal::from(h.re), FftReal::from(h.im));
        out.re += x.re * hr - x.im * hi;
        out.im += x.re * hi + x.im * hr;
    }
}

/// Converts a transform-precision spectrum into impulse storage precision.
#[inline]
pub fn store_spectrum(dst: &mut [Complex<ImpulseReal>], src: &[Complex<FftReal>]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d = Complex::new(s.re as ImpulseReal, s.im as ImpulseReal);
    }
}
