use std::{env, error::Error as StdError};

use lazy_static::lazy_static;
use sonyflake::Sonyflake;

use crate::{errors, Result};

const MACHINE_ID: &str = "GIM_MACHINE_ID";

lazy_static! {
    static ref GENERATOR: std::result::Result<Sonyflake, String> = {
        let builder = Sonyflake::builder();
        let built = match env::var_os(MACHINE_ID) {
            Some(_) => builder.machine_id(&configured_machine_id).finalize(),
            // lower 16 bits of the private IP
            None => builder.finalize(),
        };
        built.map_err(|err| err.to_string())
    };
}

type MachineId = std::result::Result<u16, Box<dyn StdError + Send + Sync>>;

fn configured_machine_id() -> MachineId {
    parse_machine_id(&env::var(MACHINE_ID)?)
}

fn parse_machine_id(raw: &str) -> MachineId {
    Ok(raw.trim().parse::<u16>()?)
}

pub fn next_id() -> Result<u64> {
    match GENERATOR.as_ref() {
        Ok(generator) => generator.next_id().map_err(errors::any),
        Err(err) => Err(errors::anyhow(anyhow::anyhow!(
            "id generator unavailable: {}",
            err
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increase() {
        let first = next_id().unwrap();
        let second = next_id().unwrap();
        assert!(second > first);
    }

    #[test]
    fn machine_id_must_fit_sixteen_bits() {
        assert_eq!(parse_machine_id(" 7\n").unwrap(), 7);
        assert!(parse_machine_id("70000").is_err());
        assert!(parse_machine_id("node-1").is_err());
    }
}
