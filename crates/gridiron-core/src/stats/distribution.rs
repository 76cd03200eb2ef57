// Distribution functions used by the tests and models.
//
// Normal and F tails come from statrs. statrs has no studentized range
// distribution, so `ptukey`/`qtukey` are computed here by Gauss-Legendre
// quadrature (Copenhaver & Holland, 1988).

use std::f64::consts::{LN_2, SQRT_2};

use statrs::distribution::{ContinuousCDF, FisherSnedecor};
use statrs::function::erf::erfc;
use statrs::function::gamma::ln_gamma;

/// Standard normal CDF.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Two-sided p-value for a standard normal test statistic.
pub fn normal_two_sided(z: f64) -> f64 {
    erfc(z.abs() / SQRT_2)
}

/// Upper tail of the F distribution, `None` for invalid degrees of freedom.
pub fn f_upper_tail(f: f64, df1: f64, df2: f64) -> Option<f64> {
    let dist = FisherSnedecor::new(df1, df2).ok()?;
    Some(dist.sf(f))
}

// ---------------------------------------------------------------------------
// Studentized range
// ---------------------------------------------------------------------------

const SQRT_2PI: f64 = 2.506_628_274_631_000_5;

// 12-point Gauss-Legendre nodes/weights (half), for the inner integral.
const XLEG: [f64; 6] = [
    0.981_560_634_246_719_250_690_549_090_149,
    0.904_117_256_370_474_856_678_465_866_119,
    0.769_902_674_194_304_687_036_893_833_213,
    0.587_317_954_286_617_447_296_702_418_941,
    0.367_831_498_998_180_193_752_691_536_644,
    0.125_233_408_511_468_915_472_441_369_464,
];
const ALEG: [f64; 6] = [
    0.047_175_336_386_511_827_194_615_961_485,
    0.106_939_325_995_318_430_960_254_718_194,
    0.160_078_328_543_346_226_334_652_529_543,
    0.203_167_426_723_065_921_749_064_455_810,
    0.233_492_536_538_354_808_760_849_898_925,
    0.249_147_045_813_402_785_000_562_436_043,
];

// 16-point Gauss-Legendre nodes/weights (half), for the outer integral over df.
const XLEGQ: [f64; 8] = [
    0.989_400_934_991_649_932_596_154_173_450,
    0.944_575_023_073_232_576_077_988_415_535,
    0.865_631_202_387_831_743_880_467_897_712,
    0.755_404_408_355_003_033_895_101_194_847,
    0.617_876_244_402_643_748_446_671_764_049,
    0.458_016_777_657_227_386_342_419_442_984,
    0.281_603_550_779_258_913_230_460_501_460,
    0.095_012_509_837_637_440_185_319_335_425_0,
];
const ALEGQ: [f64; 8] = [
    0.027_152_459_411_754_094_851_780_572_456_0,
    0.062_253_523_938_647_892_862_843_836_994_4,
    0.095_158_511_682_492_784_809_925_107_602_2,
    0.124_628_971_255_533_872_052_476_282_192,
    0.149_595_988_816_576_732_081_501_730_547,
    0.169_156_519_395_002_538_189_312_079_030,
    0.182_603_415_044_923_588_866_763_667_969,
    0.189_450_610_455_068_496_285_396_723_208,
];

/// Probability that the range of `cc` standard normal means is below `w`
/// (infinite degrees of freedom, one range).
fn wprob(w: f64, cc: f64) -> f64 {
    const BB: f64 = 8.0;
    const WLAR: f64 = 3.0;
    const C1: f64 = -30.0;
    const C3: f64 = 60.0;

    let qsqz = w * 0.5;
    if qsqz >= BB {
        return 1.0;
    }

    // P(|Z| < qsqz)^cc
    let mut pr_w = 2.0 * normal_cdf(qsqz) - 1.0;
    pr_w = if pr_w >= 1.0 { 1.0 } else { pr_w.powf(cc) };

    let wincr = if w > WLAR { 2 } else { 3 };
    let mut blb = qsqz;
    let binc = (BB - qsqz) / wincr as f64;
    let mut bub = blb + binc;
    let mut einsum = 0.0;
    let cc1 = cc - 1.0;
    let cutoff = (C1 / cc1).exp();

    for _ in 0..wincr {
        let mut elsum = 0.0;
        let a = 0.5 * (bub + blb);
        let b = 0.5 * (bub - blb);

        for jj in 0..12 {
            let (j, xx) = if jj >= 6 {
                let j = 11 - jj;
                (j, XLEG[j])
            } else {
                (jj, -XLEG[jj])
            };
            let ac = a + b * xx;
            let qexpo = ac * ac;
            if qexpo > C3 {
                break;
            }
            let pplus = normal_cdf(ac);
            let pminus = normal_cdf(ac - w);
            let rinsum = pplus - pminus;
            if rinsum >= cutoff {
                elsum += ALEG[j] * (-0.5 * qexpo).exp() * rinsum.powf(cc1);
            }
        }
        elsum *= 2.0 * b * cc / SQRT_2PI;
        einsum += elsum;
        blb = bub;
        bub += binc;
    }

    pr_w += einsum;
    if pr_w <= C1.exp() {
        return 0.0;
    }
    pr_w.min(1.0)
}

/// CDF of the studentized range distribution for `nmeans` groups and `df`
/// residual degrees of freedom. Returns NaN for invalid parameters.
pub fn ptukey(q: f64, nmeans: usize, df: f64) -> f64 {
    const EPS1: f64 = -30.0;
    const EPS2: f64 = 1.0e-14;
    const DLARG: f64 = 25000.0;

    if q.is_nan() || df.is_nan() {
        return f64::NAN;
    }
    if df < 2.0 || nmeans < 2 {
        return f64::NAN;
    }
    if q <= 0.0 {
        return 0.0;
    }
    if q.is_infinite() {
        return 1.0;
    }
    let cc = nmeans as f64;
    if df > DLARG {
        return wprob(q, cc);
    }

    let f2 = df * 0.5;
    let f21 = f2 - 1.0;
    let ff4 = df * 0.25;
    let ulen: f64 = if df <= 100.0 {
        1.0
    } else if df <= 800.0 {
        0.5
    } else if df <= 5000.0 {
        0.25
    } else {
        0.125
    };
    let f2lf = f2 * df.ln() - df * LN_2 - ln_gamma(f2) + ulen.ln();

    let mut ans = 0.0;
    for i in 1..=50 {
        let mut otsum = 0.0;
        let twa1 = (2 * i - 1) as f64 * ulen;

        for jj in 0..16 {
            let (j, offset) = if jj >= 8 {
                let j = jj - 8;
                (j, XLEGQ[j] * ulen)
            } else {
                (jj, -XLEGQ[jj] * ulen)
            };
            let node = twa1 + offset;
            let t1 = f2lf + f21 * node.ln() - node * ff4;
            if t1 >= EPS1 {
                let qsqz = q * (node * 0.5).sqrt();
                otsum += wprob(qsqz, cc) * ALEGQ[j] * t1.exp();
            }
        }

        if i as f64 * ulen >= 1.0 && otsum <= EPS2 {
            break;
        }
        ans += otsum;
    }

    ans.min(1.0)
}

/// Quantile of the studentized range distribution, by bisection on [`ptukey`].
pub fn qtukey(p: f64, nmeans: usize, df: f64) -> f64 {
    if !(0.0..1.0).contains(&p) || df < 2.0 || nmeans < 2 {
        return f64::NAN;
    }
    if p == 0.0 {
        return 0.0;
    }

    let mut lo = 0.0;
    let mut hi = 1.0;
    while ptukey(hi, nmeans, df) < p {
        lo = hi;
        hi *= 2.0;
        if hi > 1.0e4 {
            return f64::INFINITY;
        }
    }
    for _ in 0..100 {
        let mid = 0.5 * (lo + hi);
        if ptukey(mid, nmeans, df) < p {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < 1.0e-10 {
            break;
        }
    }
    0.5 * (lo + hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_cdf_reference_points() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-15);
        assert!((normal_cdf(1.959_963_984_540_054) - 0.975).abs() < 1e-9);
        assert!((normal_two_sided(1.959_963_984_540_054) - 0.05).abs() < 1e-9);
        assert!((normal_two_sided(-1.959_963_984_540_054) - 0.05).abs() < 1e-9);
    }

    #[test]
    fn f_tail_reference_point() {
        // F(2, 10) upper 5% point is 4.102821
        let p = f_upper_tail(4.102_821, 2.0, 10.0).unwrap();
        assert!((p - 0.05).abs() < 1e-5);
        assert!(f_upper_tail(1.0, 0.0, 10.0).is_none());
    }

    #[test]
    fn ptukey_matches_published_critical_values() {
        // Studentized range table, alpha = 0.05. For two means q = sqrt(2) * t.
        let cases = [
            (3.877_676, 3, 10.0),
            (3.577_935, 3, 20.0),
            (SQRT_2 * 2.228_139, 2, 10.0),
            (SQRT_2 * 1.959_964, 2, 1.0e6),
        ];
        for (q, k, df) in cases {
            let p = ptukey(q, k, df);
            assert!((p - 0.95).abs() < 2e-4, "ptukey({q}, {k}, {df}) = {p}");
        }
    }

    #[test]
    fn ptukey_is_monotonic() {
        let mut last = 0.0;
        for i in 1..40 {
            let p = ptukey(i as f64 * 0.2, 4, 25.0);
            assert!(p >= last);
            last = p;
        }
        assert!(last > 0.999);
    }

    #[test]
    fn ptukey_edge_values() {
        assert_eq!(ptukey(0.0, 3, 10.0), 0.0);
        assert_eq!(ptukey(f64::INFINITY, 3, 10.0), 1.0);
        assert!(ptukey(1.0, 1, 10.0).is_nan());
        assert!(ptukey(1.0, 3, 1.0).is_nan());
    }

    #[test]
    fn qtukey_inverts_ptukey() {
        let q = qtukey(0.95, 3, 20.0);
        assert!((q - 3.577_935).abs() < 1e-3, "qtukey = {q}");
        assert!((ptukey(q, 3, 20.0) - 0.95).abs() < 1e-8);
    }
}
