//! Test fixtures and helpers.
//!
//! A [`Deployment`] is a collector, some sensors and the ledger they share.
//! Identities come from fixed seeds so failures reproduce.

use std::sync::Arc;

use sensorlog_core::{
    encode, seal, Account, Address, Block, Identity, LogEntry, PhysicalQuantity, Signable,
};
use sensorlog_ledger::{Clock, Ledger, LedgerError, MemoryLedger, Result, SubmitResult};

/// Ledger time when a deployment starts: 2021-06-05T18:04:00Z.
pub const DEPLOYMENT_START: i64 = 1_622_916_240;

/// Seconds the clock advances after each published reading.
pub const READING_INTERVAL: i64 = 5;

/// One collector, N sensors and an in-memory ledger.
pub struct Deployment {
    pub collector: Identity,
    pub sensors: Vec<Account>,
    pub ledger: Arc<MemoryLedger>,
}

impl Deployment {
    /// Set up `sensor_count` sensors with open ledger accounts.
    pub async fn new(sensor_count: usize) -> Result<Self> {
        let ledger = Arc::new(MemoryLedger::with_clock(Clock::manual(DEPLOYMENT_START)));
        let mut sensors = Vec::with_capacity(sensor_count);
        for index in 0..sensor_count {
            let identity = Identity::from_seed(&sensor_seed(index));
            let next = ledger.open_account(&identity.address(), 0).await?;
            sensors.push(Account::new(identity, next));
        }
        Ok(Self {
            collector: Identity::from_seed(&[0xC0; 32]),
            sensors,
            ledger,
        })
    }

    /// A deterministic identity outside the collector and sensor seeds.
    pub fn reporter(tag: u8) -> Identity {
        let mut seed = [0xA0; 32];
        seed[31] = tag;
        Identity::from_seed(&seed)
    }

    pub fn sensor(&self, index: usize) -> Address {
        self.sensors[index].address()
    }

    pub fn clock(&self) -> &Clock {
        self.ledger.clock()
    }

    /// Publish one encrypted reading to the collector. Returns its sequence number.
    pub async fn publish_reading(
        &mut self,
        index: usize,
        quantity: PhysicalQuantity,
        value: i64,
    ) -> Result<u64> {
        let collector = self.collector.address();
        let account = &self.sensors[index];
        let payload = seal(account.identity(), &collector, account.sequence(), &encode(value))?;
        self.publish_raw(index, collector, quantity, payload).await
    }

    /// Publish temperature readings in order.
    pub async fn publish_values(&mut self, index: usize, values: &[i64]) -> Result<Vec<u64>> {
        let mut seqs = Vec::with_capacity(values.len());
        for &value in values {
            seqs.push(
                self.publish_reading(index, PhysicalQuantity::Temperature, value)
                    .await?,
            );
        }
        Ok(seqs)
    }

    /// Publish a reading whose payload decrypts to garbage.
    pub async fn publish_undecodable(&mut self, index: usize) -> Result<u64> {
        let collector = self.collector.address();
        let account = &self.sensors[index];
        let plain = [0xFF; 32];
        let payload = seal(account.identity(), &collector, account.sequence(), &plain)?;
        self.publish_raw(index, collector, PhysicalQuantity::Temperature, payload)
            .await
    }

    /// Publish a reading addressed to someone other than the collector.
    pub async fn publish_misaddressed(
        &mut self,
        index: usize,
        receiver: Address,
        value: i64,
    ) -> Result<u64> {
        let account = &self.sensors[index];
        let payload = seal(account.identity(), &receiver, account.sequence(), &encode(value))?;
        self.publish_raw(index, receiver, PhysicalQuantity::Temperature, payload)
            .await
    }

    async fn publish_raw(
        &mut self,
        index: usize,
        receiver: Address,
        quantity: PhysicalQuantity,
        payload: Block,
    ) -> Result<u64> {
        let account = &mut self.sensors[index];
        let entry = LogEntry::reading(
            account.address(),
            receiver,
            account.sequence(),
            0,
            quantity,
            payload,
        );
        match self.ledger.submit(&entry).await? {
            SubmitResult::Accepted { seq, .. } => {
                account.advance_past(seq);
                self.ledger.clock().advance(READING_INTERVAL);
                Ok(seq)
            }
            SubmitResult::SequenceConflict { expected, got } => Err(LedgerError::InvalidData(
                format!("fixture sensor out of sync: expected {}, got {}", expected, got),
            )),
        }
    }
}

fn sensor_seed(index: usize) -> [u8; 32] {
    let mut seed = [0x5E; 32];
    seed[24..].copy_from_slice(&(index as u64).to_be_bytes());
    seed
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorlog_core::{derive_shared_secret, decode, transform, SeqRange};

    #[tokio::test]
    async fn test_publish_values() {
        let mut deployment = Deployment::new(2).await.unwrap();
        let seqs = deployment.publish_values(1, &[10, 70, 40]).await.unwrap();
        assert_eq!(seqs, vec![0, 1, 2]);

        let sensor = deployment.sensor(1);
        let entries = deployment
            .ledger
            .query_range(&sensor, SeqRange::new(0, 3))
            .await
            .unwrap();
        let key = derive_shared_secret(&deployment.collector, &sensor).unwrap();
        let values: Vec<i64> = entries
            .iter()
            .map(|e| decode(&transform(e.seq, &key, &e.payload)).unwrap())
            .collect();
        assert_eq!(values, vec![10, 70, 40]);
        assert_eq!(entries[0].timestamp, DEPLOYMENT_START);
        assert_eq!(entries[2].timestamp, DEPLOYMENT_START + 2 * READING_INTERVAL);
    }

    #[tokio::test]
    async fn test_identities_are_distinct() {
        let deployment = Deployment::new(3).await.unwrap();
        let mut addresses = vec![deployment.collector.address(), Deployment::reporter(1).address()];
        addresses.extend((0..3).map(|i| deployment.sensor(i)));
        let count = addresses.len();
        addresses.sort();
        addresses.dedup();
        assert_eq!(addresses.len(), count);
    }
}
