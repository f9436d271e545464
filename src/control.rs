//! Two read-only debug views over running logs and registrations. Exit
//! codes and CLI shape are the host's concern — this module only
//! produces the data.

use crate::node_id::{LogName, SlotId};
use crate::registration_map::{Registration, RegistrationId};

#[derive(Debug, Clone)]
pub struct InstanceDump {
    pub slot: SlotId,
    pub phase: String,
    pub learned: bool,
    pub learned_value: Option<Vec<u8>>,
    pub callback_fired: bool,
}

#[derive(Debug, Clone)]
pub struct LogDump {
    pub name: LogName,
    pub instances: Vec<InstanceDump>,
}

#[derive(Debug, Clone)]
pub struct RegistrationDump {
    pub id: RegistrationId,
    pub reader_type: String,
    pub description: String,
}

impl From<(RegistrationId, Registration)> for RegistrationDump {
    fn from((id, registration): (RegistrationId, Registration)) -> Self {
        RegistrationDump {
            id,
            reader_type: registration.reader_type,
            description: registration.description,
        }
    }
}
