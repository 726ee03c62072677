//! Candidate backend endpoints and the sticky last-known-good pointer.
//!
//! [`EndpointRegistry`] owns the configured base addresses. Each logical request asks it for
//! a [`working order`](EndpointRegistry::working_order): a shuffled copy of the candidates so
//! many clients do not all hammer the same dead endpoint first, with the last endpoint that
//! answered successfully moved to the front.

// crates.io
use rand::{Rng, seq::SliceRandom};
// self
use crate::{_prelude::*, error::ConfigError};

/// Candidate base addresses plus the most recently successful one.
#[derive(Debug)]
pub struct EndpointRegistry {
	candidates: Arc<[Url]>,
	default: Url,
	last_good: RwLock<Option<Url>>,
}
impl EndpointRegistry {
	/// Creates a registry; `default` must be one of `candidates` and seeds the last-known-good
	/// pointer. When `default` is `None` the first candidate is used.
	pub fn new(candidates: Vec<Url>, default: Option<Url>) -> Result<Self, ConfigError> {
		let mut deduped: Vec<Url> = Vec::with_capacity(candidates.len());

		for candidate in candidates {
			if candidate.cannot_be_a_base() {
				return Err(ConfigError::NotABase { endpoint: candidate.to_string() });
			}
			if !deduped.contains(&candidate) {
				deduped.push(candidate);
			}
		}

		let first = deduped.first().cloned().ok_or(ConfigError::NoCandidates)?;
		let default = match default {
			Some(endpoint) if deduped.contains(&endpoint) => endpoint,
			Some(endpoint) =>
				return Err(ConfigError::DefaultNotCandidate { endpoint: endpoint.to_string() }),
			None => first,
		};

		Ok(Self::from_validated(deduped.into(), default))
	}

	pub(crate) fn from_validated(candidates: Arc<[Url]>, default: Url) -> Self {
		Self { candidates, last_good: RwLock::new(Some(default.clone())), default }
	}

	/// All configured candidates in configuration order.
	pub fn candidates(&self) -> &[Url] {
		&self.candidates
	}

	/// Number of configured candidates.
	pub fn len(&self) -> usize {
		self.candidates.len()
	}

	/// Always `false`; construction rejects empty candidate lists.
	pub fn is_empty(&self) -> bool {
		self.candidates.is_empty()
	}

	/// Designated default endpoint.
	pub fn default_endpoint(&self) -> &Url {
		&self.default
	}

	/// Endpoint that most recently served a successful request.
	pub fn last_good(&self) -> Option<Url> {
		self.last_good.read().clone()
	}

	/// Records `endpoint` as last-known-good. Returns `true` when the pointer moved.
	pub fn promote(&self, endpoint: &Url) -> bool {
		if !self.candidates.contains(endpoint) {
			return false;
		}

		let mut guard = self.last_good.write();

		if guard.as_ref() == Some(endpoint) {
			return false;
		}

		*guard = Some(endpoint.clone());

		true
	}

	/// Shuffled copy of the candidates with the last-known-good endpoint moved to the front.
	pub fn working_order<R>(&self, rng: &mut R) -> Vec<Url>
	where
		R: ?Sized + Rng,
	{
		let mut order = self.candidates.to_vec();

		order.shuffle(rng);

		if let Some(preferred) = self.last_good()
			&& let Some(position) = order.iter().position(|url| *url == preferred)
		{
			order[..=position].rotate_right(1);
		}

		order
	}
}

/// Joins a request path onto a base address, keeping any path prefix the base carries.
///
/// `https://api.example.com/v1` + `/orders` resolves to `https://api.example.com/v1/orders`,
/// unlike [`Url::join`], which would drop the `v1` segment.
pub fn resolve(base: &Url, path: &str) -> Result<Url, ConfigError> {
	let mut joined = base.clone();
	let (path, query) = match path.split_once('?') {
		Some((path, query)) => (path, Some(query)),
		None => (path, None),
	};

	{
		let mut segments = joined
			.path_segments_mut()
			.map_err(|_| ConfigError::NotABase { endpoint: base.to_string() })?;

		segments.pop_if_empty();

		for segment in path.split('/').filter(|segment| !segment.is_empty()) {
			segments.push(segment);
		}
	}

	if query.is_some() {
		joined.set_query(query);
	}

	Ok(joined)
}

#[cfg(test)]
mod tests {
	// crates.io
	use rand::{SeedableRng, rngs::StdRng};
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Test endpoint should parse.")
	}

	fn registry() -> EndpointRegistry {
		EndpointRegistry::new(
			vec![
				url("https://a.example.com"),
				url("https://b.example.com"),
				url("https://c.example.com"),
			],
			None,
		)
		.expect("Registry fixture should be valid.")
	}

	#[test]
	fn construction_validates_candidates() {
		assert!(matches!(EndpointRegistry::new(Vec::new(), None), Err(ConfigError::NoCandidates)));
		assert!(matches!(
			EndpointRegistry::new(
				vec![url("https://a.example.com")],
				Some(url("https://z.example.com")),
			),
			Err(ConfigError::DefaultNotCandidate { .. })
		));
		assert!(matches!(
			EndpointRegistry::new(vec![url("mailto:ops@example.com")], None),
			Err(ConfigError::NotABase { .. })
		));

		let deduped = EndpointRegistry::new(
			vec![url("https://a.example.com"), url("https://a.example.com")],
			None,
		)
		.expect("Duplicate candidates should collapse.");

		assert_eq!(deduped.len(), 1);
	}

	#[test]
	fn default_seeds_last_known_good() {
		let registry = EndpointRegistry::new(
			vec![url("https://a.example.com"), url("https://b.example.com")],
			Some(url("https://b.example.com")),
		)
		.expect("Registry fixture should be valid.");

		assert_eq!(registry.last_good(), Some(url("https://b.example.com")));

		let mut rng = StdRng::seed_from_u64(7);

		for _ in 0..16 {
			assert_eq!(registry.working_order(&mut rng)[0], url("https://b.example.com"));
		}
	}

	#[test]
	fn promotion_is_sticky_and_moves_endpoint_first() {
		let registry = registry();
		let mut rng = StdRng::seed_from_u64(42);

		assert!(registry.promote(&url("https://c.example.com")));
		assert!(!registry.promote(&url("https://c.example.com")));
		assert!(!registry.promote(&url("https://unknown.example.com")));

		for _ in 0..16 {
			let order = registry.working_order(&mut rng);

			assert_eq!(order[0], url("https://c.example.com"));
			assert_eq!(order.len(), 3);
		}
	}

	#[test]
	fn working_order_is_a_permutation() {
		let registry = registry();
		let mut rng = StdRng::seed_from_u64(1);
		let mut order = registry.working_order(&mut rng);

		order.sort();

		let mut expected = registry.candidates().to_vec();

		expected.sort();

		assert_eq!(order, expected);
	}

	#[test]
	fn resolve_keeps_base_prefix() {
		let base = url("https://api.example.com/v1");

		assert_eq!(
			resolve(&base, "/orders").expect("Path should join.").as_str(),
			"https://api.example.com/v1/orders"
		);
		assert_eq!(
			resolve(&url("https://api.example.com/"), "health")
				.expect("Path should join.")
				.as_str(),
			"https://api.example.com/health"
		);
		assert_eq!(
			resolve(&base, "/webhooks?page=2").expect("Query should be preserved.").as_str(),
			"https://api.example.com/v1/webhooks?page=2"
		);
	}
}
