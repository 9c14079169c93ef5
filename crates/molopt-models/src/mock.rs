//! Reference collaborators for development and testing.
//!
//! These stand in for the external inference engine and structure embedder:
//! a harmonic pair potential, a steepest-descent optimizer, and a SMILES
//! embedder that lays atoms out along a chain. They are deterministic and
//! cheap, which makes them suitable for the CLI's offline mode and for tests.

use async_trait::async_trait;
use molopt_abstraction::{
    AtomicNumber, Device, Evaluation, Geometry, GeometryOptimizer, ModelError,
    OptimizationOutcome, OptimizationParameters, Potential, StructureEmbedder, atomic_number,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

use crate::registry::{ModelId, ModelLoader};

/// Equilibrium separation of every atom pair, in Angstrom.
const EQUILIBRIUM_DISTANCE: f64 = 1.2;

/// Spring constant of every atom pair, in Hartree per square Angstrom.
const SPRING_CONSTANT: f64 = 0.5;

/// A harmonic all-pairs potential.
///
/// `E = sum over pairs of k/2 * (r - r0)^2`.
#[derive(Debug)]
pub struct MockPotential {
    id: String,
    device: Device,
    unloads: Arc<AtomicUsize>,
    fail_unload: bool,
}

impl MockPotential {
    /// Creates a potential reporting `id` and `device`.
    #[must_use]
    pub fn new(id: impl Into<String>, device: Device) -> Self {
        Self {
            id: id.into(),
            device,
            unloads: Arc::new(AtomicUsize::new(0)),
            fail_unload: false,
        }
    }

    fn with_unload_counter(mut self, unloads: Arc<AtomicUsize>, fail_unload: bool) -> Self {
        self.unloads = unloads;
        self.fail_unload = fail_unload;
        self
    }

    /// Number of times `unload` was called.
    #[must_use]
    pub fn unload_count(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Potential for MockPotential {
    fn model_id(&self) -> &str {
        &self.id
    }

    fn device(&self) -> Device {
        self.device
    }

    async fn evaluate(&self, geometry: &Geometry) -> Result<Evaluation, ModelError> {
        if geometry.is_empty() {
            return Err(ModelError::InvalidGeometry("Structure has no atoms".to_string()));
        }

        let coordinates = &geometry.coordinates;
        let mut energy = 0.0;
        let mut forces = vec![[0.0; 3]; coordinates.len()];

        for i in 0..coordinates.len() {
            for j in (i + 1)..coordinates.len() {
                let delta = [
                    coordinates[j][0] - coordinates[i][0],
                    coordinates[j][1] - coordinates[i][1],
                    coordinates[j][2] - coordinates[i][2],
                ];
                let distance = delta.iter().map(|d| d * d).sum::<f64>().sqrt();
                let stretch = distance - EQUILIBRIUM_DISTANCE;
                energy += 0.5 * SPRING_CONSTANT * stretch * stretch;

                if distance > f64::EPSILON {
                    // Positive stretch pulls the pair together.
                    let magnitude = SPRING_CONSTANT * stretch / distance;
                    for axis in 0..3 {
                        forces[i][axis] += magnitude * delta[axis];
                        forces[j][axis] -= magnitude * delta[axis];
                    }
                }
            }
        }

        debug!(model_id = %self.id, atoms = geometry.len(), energy, "MockPotential evaluated");
        Ok(Evaluation { energy, forces })
    }

    fn unload(&self) -> Result<(), ModelError> {
        self.unloads.fetch_add(1, Ordering::SeqCst);
        if self.fail_unload {
            return Err(ModelError::Device(format!("{} refused to release memory", self.id)));
        }
        Ok(())
    }
}

/// Loader producing [`MockPotential`]s, with call counting and injectable
/// failures.
#[derive(Debug, Default)]
pub struct MockLoader {
    loads: AtomicUsize,
    loads_by_model: Mutex<HashMap<ModelId, usize>>,
    failing: Mutex<HashSet<ModelId>>,
    unloads: Arc<AtomicUsize>,
    fail_unload: AtomicBool,
    delay: Option<Duration>,
}

impl MockLoader {
    /// Creates a loader that always succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every load sleep for `delay` before returning.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes loads of `id` fail.
    #[must_use]
    pub fn failing(self, id: ModelId) -> Self {
        self.set_failing(id, true);
        self
    }

    /// Makes potentials produced from now on fail to unload.
    #[must_use]
    pub fn with_failing_unload(self) -> Self {
        self.fail_unload.store(true, Ordering::SeqCst);
        self
    }

    /// Toggles failure for loads of `id`.
    pub fn set_failing(&self, id: ModelId, failing: bool) {
        let mut set = self.failing.lock().unwrap_or_else(PoisonError::into_inner);
        if failing {
            set.insert(id);
        } else {
            set.remove(&id);
        }
    }

    /// Total loader invocations, including failed ones.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Loader invocations for one model.
    #[must_use]
    pub fn loads_of(&self, id: ModelId) -> usize {
        let loads = self.loads_by_model.lock().unwrap_or_else(PoisonError::into_inner);
        loads.get(&id).copied().unwrap_or(0)
    }

    /// Total `unload` calls on potentials produced by this loader.
    #[must_use]
    pub fn unload_count(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for MockLoader {
    async fn load(&self, id: ModelId, device: &Device) -> Result<Arc<dyn Potential>, ModelError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        {
            let mut loads = self.loads_by_model.lock().unwrap_or_else(PoisonError::into_inner);
            *loads.entry(id).or_insert(0) += 1;
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failing =
            self.failing.lock().unwrap_or_else(PoisonError::into_inner).contains(&id);
        if failing {
            return Err(ModelError::LoadFailed(format!("{} weights are corrupt", id)));
        }

        let potential = MockPotential::new(id.as_str(), *device).with_unload_counter(
            Arc::clone(&self.unloads),
            self.fail_unload.load(Ordering::SeqCst),
        );
        Ok(Arc::new(potential))
    }
}

/// Largest displacement of any atom in one step, in Angstrom.
const MAX_DISPLACEMENT: f64 = 0.2;

/// Steepest descent with an adaptive step size.
///
/// Every [`OptimizationAlgorithm`](molopt_abstraction::OptimizationAlgorithm)
/// is accepted and relaxed the same way.
#[derive(Debug, Clone, Copy)]
pub struct SteepestDescentOptimizer {
    initial_step: f64,
}

impl Default for SteepestDescentOptimizer {
    fn default() -> Self {
        Self { initial_step: 0.5 }
    }
}

impl SteepestDescentOptimizer {
    /// Creates an optimizer with the default initial step.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn displaced(geometry: &Geometry, forces: &[[f64; 3]], step: f64) -> Geometry {
        let coordinates = geometry
            .coordinates
            .iter()
            .zip(forces)
            .map(|(position, force)| {
                let norm = force.iter().map(|f| f * f).sum::<f64>().sqrt();
                let scale = if norm * step > MAX_DISPLACEMENT { MAX_DISPLACEMENT / norm } else { step };
                [
                    position[0] + scale * force[0],
                    position[1] + scale * force[1],
                    position[2] + scale * force[2],
                ]
            })
            .collect();
        Geometry { elements: geometry.elements.clone(), coordinates }
    }
}

#[async_trait]
impl GeometryOptimizer for SteepestDescentOptimizer {
    async fn optimize(
        &self,
        potential: &dyn Potential,
        geometry: Geometry,
        parameters: &OptimizationParameters,
    ) -> Result<OptimizationOutcome, ModelError> {
        debug!(
            model_id = %potential.model_id(),
            algorithm = %parameters.algorithm,
            max_steps = parameters.max_steps,
            fmax = parameters.fmax,
            "Starting steepest descent"
        );

        let mut geometry = geometry;
        let mut evaluation = potential.evaluate(&geometry).await?;
        let mut step = self.initial_step;
        let mut steps = 0;

        while steps < parameters.max_steps && evaluation.max_force() > parameters.fmax {
            let trial = Self::displaced(&geometry, &evaluation.forces, step);
            let trial_evaluation = potential.evaluate(&trial).await?;
            if trial_evaluation.energy <= evaluation.energy {
                geometry = trial;
                evaluation = trial_evaluation;
                step = (step * 1.2).min(1.0);
            } else {
                step *= 0.5;
            }
            steps += 1;
        }

        let converged = evaluation.max_force() <= parameters.fmax;
        Ok(OptimizationOutcome { geometry, evaluation, steps, converged })
    }
}

#[derive(Debug)]
struct ParsedAtom {
    element: AtomicNumber,
    aromatic: bool,
    bond_order: u32,
    explicit_hydrogens: Option<u32>,
}

impl ParsedAtom {
    fn implicit_hydrogens(&self) -> u32 {
        if let Some(count) = self.explicit_hydrogens {
            return count;
        }
        let valences: &[u32] = match self.element {
            5 | 7 => &[3],
            6 => &[4],
            8 => &[2],
            15 => &[3, 5],
            16 => &[2, 4, 6],
            9 | 17 | 35 => &[1],
            _ => &[0],
        };
        let used = self.bond_order + u32::from(self.aromatic);
        valences
            .iter()
            .find(|&&valence| valence >= used)
            .map_or(0, |valence| valence - used)
    }
}

/// Embeds a practical subset of SMILES by placing heavy atoms along a zigzag
/// chain and their implicit hydrogens around them.
///
/// Supported: organic-subset atoms (`B C N O P S F Cl Br` and aromatic
/// `b c n o p s`), bracket atoms with an `H` count, bonds `- = # :`, branches,
/// single-digit ring closures and `.` separators. Stereo markers are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainEmbedder;

impl ChainEmbedder {
    /// Creates the embedder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn invalid(identifier: &str, reason: impl std::fmt::Display) -> ModelError {
        ModelError::InvalidIdentifier(format!("Invalid SMILES '{identifier}': {reason}"))
    }

    fn parse(identifier: &str) -> Result<Vec<ParsedAtom>, ModelError> {
        let chars: Vec<char> = identifier.trim().chars().collect();
        if chars.is_empty() {
            return Err(Self::invalid(identifier, "empty identifier"));
        }

        let mut atoms: Vec<ParsedAtom> = Vec::new();
        let mut previous: Option<usize> = None;
        let mut branches: Vec<Option<usize>> = Vec::new();
        let mut rings: HashMap<u32, (usize, u32)> = HashMap::new();
        let mut pending_order: Option<u32> = None;
        let mut index = 0;

        while index < chars.len() {
            let c = chars[index];
            index += 1;

            let atom = match c {
                '(' => {
                    branches.push(previous);
                    continue;
                }
                ')' => {
                    previous = branches
                        .pop()
                        .ok_or_else(|| Self::invalid(identifier, "unbalanced ')'"))?;
                    continue;
                }
                '-' | ':' | '/' | '\\' => {
                    pending_order = Some(1);
                    continue;
                }
                '=' => {
                    pending_order = Some(2);
                    continue;
                }
                '#' => {
                    pending_order = Some(3);
                    continue;
                }
                '.' => {
                    previous = None;
                    continue;
                }
                '0'..='9' => {
                    let digit = c.to_digit(10).unwrap_or_default();
                    let current =
                        previous.ok_or_else(|| Self::invalid(identifier, "ring bond before atom"))?;
                    if let Some((partner, order)) = rings.remove(&digit) {
                        let order = pending_order.take().unwrap_or(order);
                        atoms[partner].bond_order += order;
                        atoms[current].bond_order += order;
                    } else {
                        rings.insert(digit, (current, pending_order.take().unwrap_or(1)));
                    }
                    continue;
                }
                '[' => {
                    let close = chars[index..]
                        .iter()
                        .position(|&ch| ch == ']')
                        .ok_or_else(|| Self::invalid(identifier, "unclosed '['"))?;
                    let body: String = chars[index..index + close].iter().collect();
                    index += close + 1;
                    Self::parse_bracket(identifier, &body)?
                }
                _ => {
                    let two: String = chars[index - 1..chars.len().min(index + 1)].iter().collect();
                    let symbol = if two == "Cl" || two == "Br" {
                        index += 1;
                        two
                    } else {
                        c.to_string()
                    };
                    Self::parse_organic(identifier, &symbol)?
                }
            };

            let current = atoms.len();
            atoms.push(atom);
            if let Some(prev) = previous {
                let order = pending_order.take().unwrap_or(1);
                atoms[prev].bond_order += order;
                atoms[current].bond_order += order;
            }
            pending_order = None;
            previous = Some(current);
        }

        if !branches.is_empty() {
            return Err(Self::invalid(identifier, "unbalanced '('"));
        }
        if !rings.is_empty() {
            return Err(Self::invalid(identifier, "unclosed ring bond"));
        }
        if atoms.is_empty() {
            return Err(Self::invalid(identifier, "no atoms"));
        }
        Ok(atoms)
    }

    fn parse_organic(identifier: &str, symbol: &str) -> Result<ParsedAtom, ModelError> {
        let (element, aromatic) = match symbol {
            "B" | "C" | "N" | "O" | "P" | "S" | "F" | "Cl" | "Br" => {
                (atomic_number(symbol), false)
            }
            "b" | "c" | "n" | "o" | "p" | "s" => (atomic_number(symbol), true),
            _ => (None, false),
        };
        let element = element
            .ok_or_else(|| Self::invalid(identifier, format!("unsupported atom '{symbol}'")))?;
        Ok(ParsedAtom { element, aromatic, bond_order: 0, explicit_hydrogens: None })
    }

    fn parse_bracket(identifier: &str, body: &str) -> Result<ParsedAtom, ModelError> {
        let body = body.trim_start_matches(|c: char| c.is_ascii_digit());
        let symbol_len = body
            .char_indices()
            .skip(1)
            .find(|(_, c)| !c.is_ascii_lowercase())
            .map_or(body.len(), |(i, _)| i);
        let (symbol, rest) = body.split_at(symbol_len);
        let aromatic = symbol.chars().next().is_some_and(|c| c.is_ascii_lowercase());

        let element = atomic_number(symbol)
            .or_else(|| atomic_number(&symbol[..symbol.len().min(1)]).filter(|_| aromatic))
            .ok_or_else(|| Self::invalid(identifier, format!("unsupported atom '[{body}]'")))?;

        let rest = rest.trim_start_matches('@');
        let hydrogens = rest.strip_prefix('H').map_or(0, |after| {
            after
                .chars()
                .take_while(char::is_ascii_digit)
                .collect::<String>()
                .parse()
                .unwrap_or(1)
        });

        Ok(ParsedAtom { element, aromatic, bond_order: 0, explicit_hydrogens: Some(hydrogens) })
    }
}

impl StructureEmbedder for ChainEmbedder {
    fn identifier_to_structure(&self, identifier: &str) -> Result<Geometry, ModelError> {
        let atoms = Self::parse(identifier)?;

        let mut elements = Vec::new();
        let mut coordinates = Vec::new();
        for (i, atom) in atoms.iter().enumerate() {
            let x = 1.5 * i as f64;
            let y = if i % 2 == 0 { 0.0 } else { 0.9 };
            elements.push(atom.element);
            coordinates.push([x, y, 0.0]);
        }

        for (i, atom) in atoms.iter().enumerate() {
            let [x, y, _] = coordinates[i];
            let count = atom.implicit_hydrogens();
            for h in 0..count {
                let angle = std::f64::consts::TAU * f64::from(h) / f64::from(count);
                elements.push(1);
                coordinates.push([x, y + angle.cos(), angle.sin()]);
            }
        }

        debug!(identifier, atoms = elements.len(), "Embedded structure");
        Geometry::new(elements, coordinates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use molopt_abstraction::OptimizationAlgorithm;

    fn count(geometry: &Geometry, element: AtomicNumber) -> usize {
        geometry.elements.iter().filter(|&&z| z == element).count()
    }

    #[tokio::test]
    async fn test_mock_potential_pair_energy_and_forces() {
        let potential = MockPotential::new("mock", Device::Cpu);
        let geometry = Geometry::new(vec![1, 1], vec![[0.0, 0.0, 0.0], [2.0, 0.0, 0.0]]).unwrap();

        let evaluation = potential.evaluate(&geometry).await.unwrap();
        // 0.5 * 0.5 * (2.0 - 1.2)^2
        assert!((evaluation.energy - 0.16).abs() < 1e-12);
        // The stretched bond pulls the atoms together.
        assert!(evaluation.forces[0][0] > 0.0);
        assert!(evaluation.forces[1][0] < 0.0);
        assert!((evaluation.forces[0][0] + evaluation.forces[1][0]).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_mock_potential_rejects_empty_structure() {
        let potential = MockPotential::new("mock", Device::Cpu);
        let empty = Geometry::new(vec![], vec![]).unwrap();
        assert!(matches!(potential.evaluate(&empty).await, Err(ModelError::InvalidGeometry(_))));
    }

    #[tokio::test]
    async fn test_mock_loader_counts_and_fails() {
        let loader = MockLoader::new().failing(ModelId::Ani1x);

        let potential = loader.load(ModelId::Ani2x, &Device::Cuda(1)).await.unwrap();
        assert_eq!(potential.model_id(), "ANI2x");
        assert_eq!(potential.device(), Device::Cuda(1));

        assert!(matches!(
            loader.load(ModelId::Ani1x, &Device::Cpu).await,
            Err(ModelError::LoadFailed(_))
        ));
        assert_eq!(loader.load_count(), 2);
        assert_eq!(loader.loads_of(ModelId::Ani1x), 1);

        loader.set_failing(ModelId::Ani1x, false);
        assert!(loader.load(ModelId::Ani1x, &Device::Cpu).await.is_ok());

        potential.unload().unwrap();
        assert_eq!(loader.unload_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_unload() {
        let loader = MockLoader::new().with_failing_unload();
        let potential = loader.load(ModelId::Ani2x, &Device::Cpu).await.unwrap();
        assert!(matches!(potential.unload(), Err(ModelError::Device(_))));
        assert_eq!(loader.unload_count(), 1);
    }

    #[tokio::test]
    async fn test_steepest_descent_relaxes_pair() {
        let potential = MockPotential::new("mock", Device::Cpu);
        let geometry = Geometry::new(vec![1, 1], vec![[0.0, 0.0, 0.0], [2.0, 0.0, 0.0]]).unwrap();
        let parameters = OptimizationParameters {
            algorithm: OptimizationAlgorithm::Fire,
            max_steps: 500,
            fmax: 1e-4,
            charge: 0,
        };

        let outcome = SteepestDescentOptimizer::new()
            .optimize(&potential, geometry, &parameters)
            .await
            .unwrap();

        assert!(outcome.converged);
        assert!(outcome.steps > 0);
        let [a, b] = [outcome.geometry.coordinates[0], outcome.geometry.coordinates[1]];
        let distance = ((b[0] - a[0]).powi(2) + (b[1] - a[1]).powi(2) + (b[2] - a[2]).powi(2)).sqrt();
        assert!((distance - EQUILIBRIUM_DISTANCE).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_steepest_descent_respects_step_limit() {
        let potential = MockPotential::new("mock", Device::Cpu);
        let geometry = Geometry::new(vec![1, 1], vec![[0.0, 0.0, 0.0], [5.0, 0.0, 0.0]]).unwrap();
        let parameters = OptimizationParameters { max_steps: 2, ..OptimizationParameters::default() };

        let outcome = SteepestDescentOptimizer::new()
            .optimize(&potential, geometry, &parameters)
            .await
            .unwrap();

        assert_eq!(outcome.steps, 2);
        assert!(!outcome.converged);
    }

    #[test]
    fn test_embed_ethanol() {
        let geometry = ChainEmbedder.identifier_to_structure("CCO").unwrap();
        assert_eq!(count(&geometry, 6), 2);
        assert_eq!(count(&geometry, 8), 1);
        assert_eq!(count(&geometry, 1), 6);
        assert_eq!(geometry.len(), 9);
    }

    #[test]
    fn test_embed_benzene_and_branches() {
        let benzene = ChainEmbedder.identifier_to_structure("c1ccccc1").unwrap();
        assert_eq!(count(&benzene, 6), 6);
        assert_eq!(count(&benzene, 1), 6);

        let acetic_acid = ChainEmbedder.identifier_to_structure("CC(=O)O").unwrap();
        assert_eq!(count(&acetic_acid, 1), 4);

        let chloroform = ChainEmbedder.identifier_to_structure("ClC(Cl)Cl").unwrap();
        assert_eq!(count(&chloroform, 17), 3);
        assert_eq!(count(&chloroform, 1), 1);
    }

    #[test]
    fn test_embed_bracket_atoms() {
        let pyrrole = ChainEmbedder.identifier_to_structure("c1cc[nH]c1").unwrap();
        assert_eq!(count(&pyrrole, 7), 1);
        assert_eq!(count(&pyrrole, 1), 5);
    }

    #[test]
    fn test_embed_rejects_malformed_identifiers() {
        for identifier in ["", "C(C", "CC)", "C1CC", "Xx", "[Zz]", "1CC", "C[C"] {
            assert!(
                matches!(
                    ChainEmbedder.identifier_to_structure(identifier),
                    Err(ModelError::InvalidIdentifier(_))
                ),
                "{identifier} should be rejected"
            );
        }
    }
}
