use std::{fmt, sync::Arc, time::Duration};

#[cfg(feature = "serde")]
use serde::Deserialize;

use crate::error::ConfigError;

/// Measures how much an item contributes towards the size threshold
pub type Calculate<T> = Arc<dyn Fn(&T) -> usize + Send + Sync>;

/// Unvalidated batching thresholds. Count, delay and size are independent triggers: a batch is
/// released as soon as any configured threshold is crossed, or when released explicitly.
///
/// ```ignore
/// let options = Options::default()
///   .with_count(100)
///   .with_delay(Duration::from_millis(5))
///   .with_size(64 * 1024, |payload: &Vec<u8>| payload.len());
/// ```
#[cfg_attr(feature = "serde", derive(Deserialize), serde(bound = ""))]
pub struct Options<T> {
  pub count: Option<CountOptions>,
  pub delay: Option<DelayOptions>,
  pub size: Option<SizeOptions<T>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct CountOptions {
  /// Release once a batch holds this many items
  pub max: Option<i64>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct DelayOptions {
  /// Milliseconds after the first item of a batch at which the batch is released
  pub max: Option<i64>,
}

#[cfg_attr(feature = "serde", derive(Deserialize), serde(bound = ""))]
pub struct SizeOptions<T> {
  /// Release once the accumulated size of a batch reaches this value
  pub max: Option<usize>,
  #[cfg_attr(feature = "serde", serde(skip))]
  pub calculate: Option<Calculate<T>>,
  /// Reject items individually larger than `max` rather than batching them alone. Defaults to
  /// `true`
  pub strict: Option<bool>,
}

impl<T> Default for Options<T> {
  fn default() -> Self {
    Options {
      count: None,
      delay: None,
      size: None,
    }
  }
}

impl<T> Default for SizeOptions<T> {
  fn default() -> Self {
    SizeOptions {
      max: None,
      calculate: None,
      strict: None,
    }
  }
}

impl<T> Clone for Options<T> {
  fn clone(&self) -> Self {
    Options {
      count: self.count,
      delay: self.delay,
      size: self.size.clone(),
    }
  }
}

impl<T> Clone for SizeOptions<T> {
  fn clone(&self) -> Self {
    SizeOptions {
      max: self.max,
      calculate: self.calculate.clone(),
      strict: self.strict,
    }
  }
}

impl<T> fmt::Debug for Options<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Options")
      .field("count", &self.count)
      .field("delay", &self.delay)
      .field("size", &self.size)
      .finish()
  }
}

impl<T> fmt::Debug for SizeOptions<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SizeOptions")
      .field("max", &self.max)
      .field("calculate", &self.calculate.as_ref().map(|_| "Fn(&T) -> usize"))
      .field("strict", &self.strict)
      .finish()
  }
}

impl<T> Options<T> {
  pub fn with_count(mut self, max: i64) -> Self {
    self.count = Some(CountOptions { max: Some(max) });
    self
  }

  /// Configure a delay threshold, rounded up to whole milliseconds
  pub fn with_delay(mut self, max: Duration) -> Self {
    let millis = max.as_millis() + u128::from(max.subsec_nanos() % 1_000_000 != 0);
    let max = i64::try_from(millis).unwrap_or(i64::MAX);
    self.delay = Some(DelayOptions { max: Some(max) });
    self
  }

  /// Configure a size threshold measured by `calculate`
  pub fn with_size<F>(mut self, max: usize, calculate: F) -> Self
  where
    F: Fn(&T) -> usize + Send + Sync + 'static,
  {
    let size = self.size.get_or_insert_with(SizeOptions::default);
    size.max = Some(max);
    size.calculate = Some(Arc::new(calculate));
    self
  }

  /// Attach a size calculation to options whose `size.max` came from configuration
  pub fn with_calculate<F>(mut self, calculate: F) -> Self
  where
    F: Fn(&T) -> usize + Send + Sync + 'static,
  {
    self
      .size
      .get_or_insert_with(SizeOptions::default)
      .calculate = Some(Arc::new(calculate));
    self
  }

  pub fn with_strict(mut self, strict: bool) -> Self {
    self.size.get_or_insert_with(SizeOptions::default).strict = Some(strict);
    self
  }

  pub(crate) fn validate(self) -> Result<Config<T>, ConfigError> {
    let count = match self.count {
      Some(CountOptions { max: Some(max) }) if max >= 1 => {
        Some(usize::try_from(max).unwrap_or(usize::MAX))
      }
      Some(_) => return Err(ConfigError::InvalidCount),
      None => None,
    };

    let delay = match self.delay {
      Some(DelayOptions { max: Some(max) }) if max >= 0 => {
        Some(Duration::from_millis(max.unsigned_abs()))
      }
      Some(_) => return Err(ConfigError::InvalidDelay),
      None => None,
    };

    let size = match self.size {
      Some(SizeOptions {
        max,
        calculate,
        strict,
      }) => {
        let max = max.ok_or(ConfigError::InvalidSizeMax)?;
        let calculate = calculate.ok_or(ConfigError::MissingCalculate)?;

        Some(SizeLimit {
          max,
          calculate,
          strict: strict.unwrap_or(true),
        })
      }
      None => None,
    };

    Ok(Config { count, delay, size })
  }
}

/// Validated, immutable thresholds
pub(crate) struct Config<T> {
  pub(crate) count: Option<usize>,
  pub(crate) delay: Option<Duration>,
  pub(crate) size: Option<SizeLimit<T>>,
}

pub(crate) struct SizeLimit<T> {
  pub(crate) max: usize,
  pub(crate) calculate: Calculate<T>,
  pub(crate) strict: bool,
}

impl<T> SizeLimit<T> {
  #[inline(always)]
  pub(crate) fn measure(&self, item: &T) -> usize {
    (self.calculate)(item)
  }
}

#[cfg(test)]
mod test {
  use std::time::Duration;

  use super::{CountOptions, DelayOptions, Options, SizeOptions};
  use crate::error::ConfigError;

  fn len(item: &String) -> usize {
    item.len()
  }

  #[test]
  fn it_accepts_no_thresholds() {
    let config = Options::<String>::default().validate().unwrap();

    assert!(config.count.is_none());
    assert!(config.delay.is_none());
    assert!(config.size.is_none());
  }

  #[test]
  fn it_normalizes_all_thresholds() {
    let config = Options::<String>::default()
      .with_count(10)
      .with_delay(Duration::from_millis(25))
      .with_size(64, len)
      .validate()
      .unwrap();

    assert_eq!(config.count, Some(10));
    assert_eq!(config.delay, Some(Duration::from_millis(25)));

    let size = config.size.unwrap();
    assert_eq!(size.max, 64);
    assert!(size.strict);
    assert_eq!(size.measure(&"hello".to_string()), 5);
  }

  #[test]
  fn it_rounds_delays_up_to_whole_milliseconds() {
    let delay = |max| Options::<String>::default().with_delay(max).validate().unwrap().delay;

    assert_eq!(delay(Duration::from_micros(900)), Some(Duration::from_millis(1)));
    assert_eq!(delay(Duration::from_micros(2001)), Some(Duration::from_millis(3)));
    assert_eq!(delay(Duration::from_millis(25)), Some(Duration::from_millis(25)));
    assert_eq!(delay(Duration::ZERO), Some(Duration::ZERO));
  }

  #[test]
  fn it_rejects_count_below_one() {
    let err = Options::<String>::default()
      .with_count(0)
      .validate()
      .err()
      .unwrap();

    assert_eq!(err, ConfigError::InvalidCount);
    assert_eq!(err.to_string(), "count.max must be a number >= 1");
  }

  #[test]
  fn it_rejects_count_without_max() {
    let options = Options::<String> {
      count: Some(CountOptions { max: None }),
      ..Options::default()
    };

    assert_eq!(options.validate().err(), Some(ConfigError::InvalidCount));
  }

  #[test]
  fn it_rejects_negative_delay() {
    let options = Options::<String> {
      delay: Some(DelayOptions { max: Some(-1) }),
      ..Options::default()
    };

    let err = options.validate().err().unwrap();
    assert_eq!(err, ConfigError::InvalidDelay);
    assert_eq!(err.to_string(), "delay.max must be a number >= 0");
  }

  #[test]
  fn it_accepts_zero_delay() {
    let options = Options::<String> {
      delay: Some(DelayOptions { max: Some(0) }),
      ..Options::default()
    };

    assert_eq!(options.validate().unwrap().delay, Some(Duration::ZERO));
  }

  #[test]
  fn it_rejects_size_without_max() {
    let err = Options::<String>::default()
      .with_calculate(len)
      .validate()
      .err()
      .unwrap();

    assert_eq!(err, ConfigError::InvalidSizeMax);
    assert_eq!(err.to_string(), "size.max must be a number");
  }

  #[test]
  fn it_rejects_size_without_calculate() {
    let options = Options::<String> {
      size: Some(SizeOptions {
        max: Some(10),
        ..SizeOptions::default()
      }),
      ..Options::default()
    };

    let err = options.validate().err().unwrap();
    assert_eq!(err, ConfigError::MissingCalculate);
    assert_eq!(
      err.to_string(),
      "if size.max is provided, size.calculate must also be provided"
    );
  }

  #[test]
  fn it_checks_count_before_delay() {
    let options = Options::<String> {
      count: Some(CountOptions { max: Some(0) }),
      delay: Some(DelayOptions { max: Some(-5) }),
      ..Options::default()
    };

    assert_eq!(options.validate().err(), Some(ConfigError::InvalidCount));
  }

  #[test]
  fn it_honors_non_strict_sizing() {
    let size = Options::<String>::default()
      .with_size(8, len)
      .with_strict(false)
      .validate()
      .unwrap()
      .size
      .unwrap();

    assert!(!size.strict);
  }

  #[cfg(feature = "serde")]
  #[test]
  fn it_deserializes_thresholds() {
    let options: Options<String> = serde_json::from_str(
      r#"{ "count": { "max": 50 }, "delay": { "max": 10 }, "size": { "max": 1024, "strict": false } }"#,
    )
    .unwrap();

    assert_eq!(options.count, Some(CountOptions { max: Some(50) }));

    assert_eq!(
      options.clone().validate().err(),
      Some(ConfigError::MissingCalculate)
    );

    let config = options.with_calculate(len).validate().unwrap();
    assert_eq!(config.delay, Some(Duration::from_millis(10)));
    assert!(!config.size.unwrap().strict);
  }

  #[cfg(feature = "serde")]
  #[test]
  fn it_rejects_non_boolean_strict() {
    let options = serde_json::from_str::<Options<String>>(r#"{ "size": { "max": 1, "strict": 1 } }"#);

    assert!(options.is_err());
  }
}
