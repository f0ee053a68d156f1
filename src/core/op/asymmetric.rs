use std::sync::Arc;

use parking_lot::Mutex;

use super::CryptoOp;
use super::OpCallback;
use super::OpCore;
use super::OpFlags;
use super::OpKind;
use crate::DriverId;
use crate::Error;
use crate::Result;
use crate::KALGORITHM_MAX;
use crate::MAX_ASYMMETRIC_PARAMS;

/// Asymmetric algorithm class.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsymmetricKind {
    ModExp = 0,
    ModExpCrt = 1,
    DsaSign = 2,
    DsaVerify = 3,
    DhComputeKey = 4,
    ModAdd = 5,
    ModAddInv = 6,
    ModSub = 7,
    ModMult = 8,
    ModMultInv = 9,
    Mod = 10,
}

impl AsymmetricKind {
    /// Expected `(inputs, outputs)` parameter counts.
    pub fn param_counts(&self) -> (usize, usize) {
        match self {
            AsymmetricKind::ModExp => (3, 1),
            AsymmetricKind::ModExpCrt => (6, 1),
            AsymmetricKind::DsaSign => (5, 2),
            AsymmetricKind::DsaVerify => (7, 0),
            AsymmetricKind::DhComputeKey => (3, 1),
            AsymmetricKind::ModAdd => (3, 1),
            AsymmetricKind::ModAddInv => (2, 1),
            AsymmetricKind::ModSub => (3, 1),
            AsymmetricKind::ModMult => (3, 1),
            AsymmetricKind::ModMultInv => (2, 1),
            AsymmetricKind::Mod => (2, 1),
        }
    }
}

impl TryFrom<u32> for AsymmetricKind {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        Ok(match value {
            0 => AsymmetricKind::ModExp,
            1 => AsymmetricKind::ModExpCrt,
            2 => AsymmetricKind::DsaSign,
            3 => AsymmetricKind::DsaVerify,
            4 => AsymmetricKind::DhComputeKey,
            5 => AsymmetricKind::ModAdd,
            6 => AsymmetricKind::ModAddInv,
            7 => AsymmetricKind::ModSub,
            8 => AsymmetricKind::ModMult,
            9 => AsymmetricKind::ModMultInv,
            10 => AsymmetricKind::Mod,
            other => {
                return Err(Error::invalid(format!(
                    "asymmetric class {} outside 0..={}",
                    other, KALGORITHM_MAX
                )))
            }
        })
    }
}

/// Set of supported asymmetric classes; bit `k` stands for class `k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureBitmap(u32);

impl FeatureBitmap {
    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(
        &self,
        kind: AsymmetricKind,
    ) -> bool {
        self.0 & (1 << kind as u32) != 0
    }

    pub(crate) fn insert(
        &mut self,
        kalg: u32,
    ) {
        self.0 |= 1 << kalg;
    }
}

/// A single public-key style operation.
///
/// Parameters are stored inputs first, followed by the output slots the
/// driver fills in.
pub struct AsymmetricOp {
    core: OpCore,
    kind: AsymmetricKind,
    inputs: usize,
    params: Mutex<Vec<Vec<u8>>>,
    target: Mutex<Option<DriverId>>,
    callback: Option<OpCallback<AsymmetricOp>>,
}

impl std::fmt::Debug for AsymmetricOp {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("AsymmetricOp")
            .field("core", &self.core)
            .field("kind", &self.kind)
            .field("target", &*self.target.lock())
            .finish_non_exhaustive()
    }
}

impl CryptoOp for AsymmetricOp {
    const KIND: OpKind = OpKind::Asymmetric;

    fn core(&self) -> &OpCore {
        &self.core
    }

    fn callback(&self) -> Option<&OpCallback<Self>> {
        self.callback.as_ref()
    }
}

impl AsymmetricOp {
    pub fn builder(kind: AsymmetricKind) -> AsymmetricOpBuilder {
        AsymmetricOpBuilder {
            kind,
            inputs: Vec::new(),
            outputs: 0,
            target: None,
            flags: OpFlags::empty(),
            callback: None,
        }
    }

    pub fn kind(&self) -> AsymmetricKind {
        self.kind
    }

    /// `None` means any capable driver may take it.
    pub fn target(&self) -> Option<DriverId> {
        *self.target.lock()
    }

    pub(crate) fn set_target(
        &self,
        driver_id: DriverId,
    ) {
        *self.target.lock() = Some(driver_id);
    }

    pub fn input(
        &self,
        index: usize,
    ) -> Option<Vec<u8>> {
        if index >= self.inputs {
            return None;
        }
        self.params.lock().get(index).cloned()
    }

    pub fn output(
        &self,
        index: usize,
    ) -> Option<Vec<u8>> {
        self.params.lock().get(self.inputs + index).cloned()
    }

    /// Drivers store results through this.
    pub fn set_output(
        &self,
        index: usize,
        value: Vec<u8>,
    ) -> Result<()> {
        let mut params = self.params.lock();
        let slot = params
            .get_mut(self.inputs + index)
            .ok_or_else(|| Error::invalid(format!("output slot {} does not exist", index)))?;
        *slot = value;
        Ok(())
    }
}

pub struct AsymmetricOpBuilder {
    kind: AsymmetricKind,
    inputs: Vec<Vec<u8>>,
    outputs: usize,
    target: Option<DriverId>,
    flags: OpFlags,
    callback: Option<OpCallback<AsymmetricOp>>,
}

impl AsymmetricOpBuilder {
    pub fn input(
        mut self,
        param: impl Into<Vec<u8>>,
    ) -> Self {
        self.inputs.push(param.into());
        self
    }

    pub fn outputs(
        mut self,
        count: usize,
    ) -> Self {
        self.outputs = count;
        self
    }

    pub fn target(
        mut self,
        driver_id: DriverId,
    ) -> Self {
        self.target = Some(driver_id);
        self
    }

    pub fn flags(
        mut self,
        flags: OpFlags,
    ) -> Self {
        self.flags = flags;
        self
    }

    pub fn callback(
        mut self,
        callback: impl Fn(Arc<AsymmetricOp>) + Send + Sync + 'static,
    ) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn build(self) -> Result<Arc<AsymmetricOp>> {
        let total = self
            .inputs
            .len()
            .checked_add(self.outputs)
            .filter(|total| *total <= MAX_ASYMMETRIC_PARAMS)
            .ok_or_else(|| {
                Error::invalid(format!(
                    "{} inputs and {} outputs exceed the maximum of {} parameters",
                    self.inputs.len(),
                    self.outputs,
                    MAX_ASYMMETRIC_PARAMS
                ))
            })?;
        let expected = self.kind.param_counts();
        if (self.inputs.len(), self.outputs) != expected {
            return Err(Error::invalid(format!(
                "{:?} takes {} inputs and {} outputs, got {} and {}",
                self.kind,
                expected.0,
                expected.1,
                self.inputs.len(),
                self.outputs
            )));
        }

        let inputs = self.inputs.len();
        let mut params = self.inputs;
        params.resize(total, Vec::new());

        Ok(Arc::new(AsymmetricOp {
            core: OpCore::new(self.flags),
            kind: self.kind,
            inputs,
            params: Mutex::new(params),
            target: Mutex::new(self.target),
            callback: self.callback,
        }))
    }
}
