//! Solar geometry, irradiance decomposition and thermal-comfort indices.
//!
//! The pipeline only talks to [`ThermalIndices`]; [`StandardIndices`] is the
//! implementation used in production. Temperatures are Kelvin on input,
//! index outputs are degrees Celsius.

use std::f64::consts::PI;

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Stefan-Boltzmann constant, W m-2 K-4.
const SIGMA: f64 = 5.67e-8;
const KELVIN: f64 = 273.15;

/// Direct and diffuse components of global horizontal irradiance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Irradiance {
    /// Direct normal irradiance, W m-2
    pub dni: f64,
    /// Diffuse horizontal irradiance, W m-2
    pub dhi: f64,
}

/// Radiation budget terms for mean radiant temperature (all W m-2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiationBudget {
    /// Surface shortwave down
    pub ssrd: f64,
    /// Net surface shortwave (down minus up)
    pub ssr: f64,
    /// Direct shortwave through a horizontal plane (down minus diffuse)
    pub dsrp: f64,
    /// Surface longwave down
    pub strd: f64,
    /// Direct normal irradiance
    pub fdir: f64,
    /// Net surface longwave (down minus up)
    pub strr: f64,
    /// Cosine of the solar zenith angle
    pub cossza: f64,
}

/// Physics used by the field pipeline.
pub trait ThermalIndices: Send + Sync {
    /// Mean cosine of the solar zenith angle over
    /// `[hour + tbegin, hour + tend]` hours of the timestamp's day, with the
    /// sun below the horizon counting as zero.
    fn cos_solar_zenith_integrated(
        &self,
        lat: f64,
        lon: f64,
        time: DateTime<Utc>,
        tbegin: f64,
        tend: f64,
    ) -> f64;

    /// Split global horizontal irradiance into direct-normal and diffuse parts.
    fn erbs(&self, ghi: f64, zenith_deg: f64, day_of_year: u32) -> Irradiance;

    /// Mean radiant temperature in Kelvin.
    fn mean_radiant_temperature(&self, budget: &RadiationBudget) -> f64;

    /// Universal Thermal Climate Index in °C.
    fn utci(&self, t2_k: f64, va_ms: f64, mrt_k: f64, td_k: f64) -> f64;

    /// Wet-bulb globe temperature in °C.
    fn wbgt(&self, t_k: f64, mrt_k: f64, va_ms: f64, td_k: f64) -> f64;
}

/// Reference implementation of [`ThermalIndices`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardIndices;

impl ThermalIndices for StandardIndices {
    fn cos_solar_zenith_integrated(
        &self,
        lat: f64,
        lon: f64,
        time: DateTime<Utc>,
        tbegin: f64,
        tend: f64,
    ) -> f64 {
        if tend <= tbegin {
            return 0.0;
        }

        // Three point Gauss-Legendre rule
        let nodes = [-(3.0f64 / 5.0).sqrt(), 0.0, (3.0f64 / 5.0).sqrt()];
        let weights = [5.0 / 9.0, 8.0 / 9.0, 5.0 / 9.0];

        let hour = time.hour() as f64;
        let day_of_year = time.ordinal() as f64;
        let (declination, time_correction) = solar_declination(day_of_year, hour);

        let (sin_dec, cos_dec) = declination.to_radians().sin_cos();
        let (sin_lat, cos_lat) = lat.to_radians().sin_cos();

        let half = (tend - tbegin) / 2.0;
        let mid = (tend + tbegin) / 2.0;

        let integral: f64 = nodes
            .iter()
            .zip(weights.iter())
            .map(|(node, weight)| {
                let t = hour + mid + node * half;
                let hour_angle = ((t - 12.0) * 15.0 + lon + time_correction).to_radians();
                let cossza = sin_dec * sin_lat + cos_dec * cos_lat * hour_angle.cos();
                weight * cossza.max(0.0) * half
            })
            .sum();

        integral / (tend - tbegin)
    }

    fn erbs(&self, ghi: f64, zenith_deg: f64, day_of_year: u32) -> Irradiance {
        const MIN_COS_ZENITH: f64 = 0.065;
        const MAX_ZENITH: f64 = 87.0;

        let dni_extra = extraterrestrial_irradiance(day_of_year);
        let cos_zenith = zenith_deg.to_radians().cos();

        let kt = (ghi / (dni_extra * cos_zenith.max(MIN_COS_ZENITH))).clamp(0.0, 1.0);

        let diffuse_fraction = if kt <= 0.22 {
            1.0 - 0.09 * kt
        } else if kt <= 0.8 {
            0.9511 - 0.1604 * kt + 4.388 * kt.powi(2) - 16.638 * kt.powi(3) + 12.336 * kt.powi(4)
        } else {
            0.165
        };

        let dhi = diffuse_fraction * ghi;
        let dni = (ghi - dhi) / cos_zenith;

        if zenith_deg > MAX_ZENITH || ghi < 0.0 || dni < 0.0 || !dni.is_finite() {
            Irradiance { dni: 0.0, dhi: ghi }
        } else {
            Irradiance { dni, dhi }
        }
    }

    fn mean_radiant_temperature(&self, b: &RadiationBudget) -> f64 {
        let diffuse = b.ssrd - b.dsrp;
        let reflected = b.ssrd - b.ssr;
        let longwave_up = b.strd - b.strr;

        let gamma = b.cossza.clamp(-1.0, 1.0).asin().to_degrees();
        let fp = 0.308 * (PI / 180.0 * gamma * (0.998 - gamma * gamma / 50_000.0)).cos();

        let absorbed = 0.5 * b.strd
            + 0.5 * longwave_up
            + (0.7 / 0.97) * (0.5 * diffuse + 0.5 * reflected + fp * b.fdir);

        (absorbed / SIGMA).powf(0.25)
    }

    fn utci(&self, t2_k: f64, va_ms: f64, mrt_k: f64, td_k: f64) -> f64 {
        // Radiative apparent temperature (Steadman 1994), bounded to the
        // wind range the UTCI regression is defined for.
        let ta = t2_k - KELVIN;
        let va = va_ms.clamp(0.5, 17.0);
        let e_hpa = vapour_pressure_hpa(td_k - KELVIN);
        let q = 0.97 * SIGMA * (mrt_k.powi(4) - t2_k.powi(4));

        ta + 0.348 * e_hpa - 0.70 * va + 0.70 * q / (va + 10.0) - 4.25
    }

    fn wbgt(&self, t_k: f64, mrt_k: f64, va_ms: f64, td_k: f64) -> f64 {
        let tc = t_k - KELVIN;
        let rh = relative_humidity(tc, td_k - KELVIN);
        let wet_bulb = stull_wet_bulb(tc, rh);
        let globe = globe_temperature(t_k, mrt_k, va_ms) - KELVIN;

        0.7 * wet_bulb + 0.2 * globe + 0.1 * tc
    }
}

/// Declination (degrees) and time correction (hour degrees) for a fractional
/// day of the year.
fn solar_declination(day_of_year: f64, hour: f64) -> (f64, f64) {
    let g = ((360.0 / 365.25) * (day_of_year + hour / 24.0)).rem_euclid(360.0);
    let g = g.to_radians();

    let declination = 0.396372 - 22.91327 * g.cos() + 4.025430 * g.sin()
        - 0.387205 * (2.0 * g).cos()
        + 0.051967 * (2.0 * g).sin()
        - 0.154527 * (3.0 * g).cos()
        + 0.084798 * (3.0 * g).sin();

    let time_correction = 0.004297 + 0.107029 * g.cos()
        - 1.837877 * g.sin()
        - 0.837378 * (2.0 * g).cos()
        - 2.340475 * (2.0 * g).sin();

    (declination, time_correction)
}

/// Spencer (1971) extraterrestrial irradiance, W m-2.
fn extraterrestrial_irradiance(day_of_year: u32) -> f64 {
    const SOLAR_CONSTANT: f64 = 1366.1;
    let b = 2.0 * PI * (day_of_year as f64 - 1.0) / 365.0;
    SOLAR_CONSTANT
        * (1.00011 + 0.034221 * b.cos() + 0.00128 * b.sin() + 0.000719 * (2.0 * b).cos()
            + 0.000077 * (2.0 * b).sin())
}

/// Saturation vapour pressure over water (Magnus form), hPa.
fn vapour_pressure_hpa(tc: f64) -> f64 {
    6.1094 * (17.625 * tc / (tc + 243.04)).exp()
}

/// Relative humidity in percent from temperature and dew point (°C).
fn relative_humidity(tc: f64, tdc: f64) -> f64 {
    (100.0 * vapour_pressure_hpa(tdc) / vapour_pressure_hpa(tc)).clamp(0.0, 100.0)
}

/// Stull (2011) wet-bulb temperature, °C.
fn stull_wet_bulb(tc: f64, rh: f64) -> f64 {
    tc * (0.151977 * (rh + 8.313659).sqrt()).atan() + (tc + rh).atan() - (rh - 1.676331).atan()
        + 0.00391838 * rh.powf(1.5) * (0.023101 * rh).atan()
        - 4.686035
}

/// Black globe temperature (K) of a 0.15 m globe, solving the steady-state
/// balance `tg^4 + f*tg = mrt^4 + f*t` by Newton iteration.
fn globe_temperature(t_k: f64, mrt_k: f64, va_ms: f64) -> f64 {
    // 10 m wind scaled to globe height (1.1 m) with a log profile
    let va = (va_ms * (1.1f64 / 0.01).ln() / (10.0f64 / 0.01).ln()).max(0.0);
    let f = 1.1e8 * va.powf(0.6) / (0.95 * 0.15f64.powf(0.4));
    let rhs = mrt_k.powi(4) + f * t_k;

    let mut tg = mrt_k.max(t_k);
    for _ in 0..50 {
        let value = tg.powi(4) + f * tg - rhs;
        let slope = 4.0 * tg.powi(3) + f;
        let step = value / slope;
        tg -= step;
        if step.abs() < 1e-9 {
            break;
        }
    }
    tg
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cza_zero_at_night() {
        let p = StandardIndices;
        // Local midnight at 0°E
        let t = Utc.with_ymd_and_hms(2024, 6, 21, 0, 0, 0).unwrap();
        assert_eq!(p.cos_solar_zenith_integrated(45.0, 0.0, t, 0.0, 1.0), 0.0);
    }

    #[test]
    fn test_cza_high_sun_near_solstice_noon() {
        let p = StandardIndices;
        // 12:00-13:00 UTC over the Tropic of Cancer at 0°E
        let t = Utc.with_ymd_and_hms(2024, 6, 21, 12, 0, 0).unwrap();
        let cza = p.cos_solar_zenith_integrated(23.44, 0.0, t, -0.5, 0.5);
        assert!(cza > 0.98, "cza = {}", cza);
    }

    #[test]
    fn test_erbs_closure() {
        let p = StandardIndices;
        let ghi = 600.0;
        let zenith = 40.0f64;
        let r = p.erbs(ghi, zenith, 172);
        let recomposed = r.dhi + r.dni * zenith.to_radians().cos();
        assert!((recomposed - ghi).abs() < 1e-6);
        assert!(r.dni > 0.0 && r.dhi > 0.0);
    }

    #[test]
    fn test_erbs_sun_below_horizon_is_all_diffuse() {
        let p = StandardIndices;
        let r = p.erbs(5.0, 95.0, 10);
        assert_eq!(r.dni, 0.0);
        assert_eq!(r.dhi, 5.0);
    }

    #[test]
    fn test_mrt_equals_air_temperature_in_longwave_equilibrium() {
        let p = StandardIndices;
        let t: f64 = 300.0;
        let lw = SIGMA * t.powi(4);
        let mrt = p.mean_radiant_temperature(&RadiationBudget {
            ssrd: 0.0,
            ssr: 0.0,
            dsrp: 0.0,
            strd: lw,
            fdir: 0.0,
            strr: 0.0,
            cossza: 0.0,
        });
        assert!((mrt - t).abs() < 1e-6);
    }

    #[test]
    fn test_globe_temperature_without_radiation_matches_air() {
        let tg = globe_temperature(300.0, 300.0, 2.0);
        assert!((tg - 300.0).abs() < 1e-6);
    }

    #[test]
    fn test_wbgt_saturated_shade() {
        let p = StandardIndices;
        // Saturated air, no radiant load: wet bulb and globe equal air temp
        let wbgt = p.wbgt(303.15, 303.15, 1.0, 303.15);
        assert!((wbgt - 30.0).abs() < 0.5, "wbgt = {}", wbgt);
    }

    #[test]
    fn test_utci_rises_with_radiation() {
        let p = StandardIndices;
        let shade = p.utci(298.15, 2.0, 298.15, 288.15);
        let sun = p.utci(298.15, 2.0, 318.15, 288.15);
        assert!(sun > shade);
    }
}
