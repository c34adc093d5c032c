//! Analog temperature and soil moisture probes on ADC1.
//!
//! Temperature is a TMP36-style output (10 mV/°C, 500 mV at 0 °C).
//! Moisture is a capacitive probe that reads high when dry.

use std::rc::Rc;

use esp_idf_svc::hal::adc::attenuation::DB_11;
use esp_idf_svc::hal::adc::oneshot::config::AdcChannelConfig;
use esp_idf_svc::hal::adc::oneshot::{AdcChannelDriver, AdcDriver};
use esp_idf_svc::hal::gpio::ADCPin;
use esp_idf_svc::hal::peripheral::Peripheral;
use tapnode::sensor::{scale_raw, SensorSample, SensorSource};

const ADC_FULL_SCALE: u16 = 4095;
const ADC_FULL_SCALE_MV: f32 = 3300.0;

type SharedAdc<'d, A> = Rc<AdcDriver<'d, A>>;

pub struct AdcSensors<'d, T, M>
where
    T: ADCPin,
    M: ADCPin<Adc = T::Adc>,
{
    temperature: AdcChannelDriver<'d, T, SharedAdc<'d, T::Adc>>,
    moisture: AdcChannelDriver<'d, M, SharedAdc<'d, T::Adc>>,
    last: SensorSample,
}

impl<'d, T, M> AdcSensors<'d, T, M>
where
    T: ADCPin,
    M: ADCPin<Adc = T::Adc>,
{
    pub fn new(
        adc: impl Peripheral<P = T::Adc> + 'd,
        temperature_pin: impl Peripheral<P = T> + 'd,
        moisture_pin: impl Peripheral<P = M> + 'd,
    ) -> anyhow::Result<Self> {
        let adc = Rc::new(AdcDriver::new(adc)?);
        let config = AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        };
        Ok(Self {
            temperature: AdcChannelDriver::new(adc.clone(), temperature_pin, &config)?,
            moisture: AdcChannelDriver::new(adc, moisture_pin, &config)?,
            last: SensorSample {
                temperature: 0.0,
                moisture: 0.0,
            },
        })
    }
}

impl<T, M> SensorSource for AdcSensors<'_, T, M>
where
    T: ADCPin,
    M: ADCPin<Adc = T::Adc>,
{
    fn sample(&mut self) -> SensorSample {
        match self.temperature.read_raw() {
            Ok(raw) => {
                let mv = scale_raw(raw, ADC_FULL_SCALE, 0.0, ADC_FULL_SCALE_MV);
                self.last.temperature = (mv - 500.0) / 10.0;
            }
            Err(e) => log::warn!("Temperature read failed: {:?}", e),
        }
        match self.moisture.read_raw() {
            Ok(raw) => self.last.moisture = scale_raw(raw, ADC_FULL_SCALE, 100.0, 0.0),
            Err(e) => log::warn!("Moisture read failed: {:?}", e),
        }
        self.last
    }
}
