use std::collections::BTreeSet;
use std::convert::Infallible;

use super::{Error, RdtMonitor, RdtReading, Result};
use crate::container::ContainerID;

/// [`RdtMonitor`] for hosts without RDT support; group creation always fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unsupported;

impl RdtMonitor for Unsupported {
    type Group = Infallible;

    fn create_group(&self, _id: &ContainerID, _pids: &BTreeSet<u32>) -> Result<Infallible> {
        Err(Error::Unsupported)
    }

    fn poll(&self, group: &Infallible) -> Result<RdtReading> {
        match *group {}
    }

    fn destroy_group(&self, group: Infallible) {
        match group {}
    }
}
