use core::mem;

use cobalt_core::WriteBuf;
use cobalt_pdu::rdp::server_license::{
    InitialMessageType, InitialServerLicenseMessage, LicenseErrorCode, LicensingStateTransition,
};
use cobalt_pdu::PduHint;

use crate::{io_channel, ConnectorResult, Sequence, State, Written};

#[derive(Default, Debug)]
#[non_exhaustive]
pub enum LicenseExchangeState {
    #[default]
    Consumed,

    WaitLicenseMessage,
    LicenseExchanged,
}

impl State for LicenseExchangeState {
    fn name(&self) -> &'static str {
        match self {
            Self::Consumed => "Consumed",
            Self::WaitLicenseMessage => "WaitLicenseMessage",
            Self::LicenseExchanged => "LicenseExchanged",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::LicenseExchanged)
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

/// Client licensing sequence.
///
/// A License Error PDU carrying `STATUS_VALID_CLIENT` is the expected
/// conclusion of the licensing phase; any other licensing message terminates
/// the connection sequence.
#[derive(Debug)]
pub struct LicenseExchangeSequence {
    pub state: LicenseExchangeState,
    pub io_channel_id: u16,
}

impl LicenseExchangeSequence {
    pub fn new(io_channel_id: u16) -> Self {
        Self {
            state: LicenseExchangeState::WaitLicenseMessage,
            io_channel_id,
        }
    }
}

impl Sequence for LicenseExchangeSequence {
    fn next_pdu_hint(&self) -> Option<&dyn PduHint> {
        match self.state {
            LicenseExchangeState::Consumed => None,
            LicenseExchangeState::WaitLicenseMessage => Some(&cobalt_pdu::X224_HINT),
            LicenseExchangeState::LicenseExchanged => None,
        }
    }

    fn state(&self) -> &dyn State {
        &self.state
    }

    fn step(&mut self, input: &[u8], _output: &mut WriteBuf) -> ConnectorResult<Written> {
        let (written, next_state) = match mem::take(&mut self.state) {
            LicenseExchangeState::Consumed => {
                return Err(general_err!("license exchange sequence state is consumed (this is a bug)"))
            }

            LicenseExchangeState::WaitLicenseMessage => {
                let send_data_indication_ctx = io_channel::decode_send_data_indication(input)?;
                let license_message = send_data_indication_ctx.decode_user_data::<InitialServerLicenseMessage>()?;

                match license_message.message_type {
                    InitialMessageType::StatusValidClient(error_message) => {
                        if error_message.error_code == LicenseErrorCode::StatusValidClient
                            && error_message.state_transition == LicensingStateTransition::NoTransition
                        {
                            debug!("Server confirmed the client license (STATUS_VALID_CLIENT)");
                            (Written::Nothing, LicenseExchangeState::LicenseExchanged)
                        } else {
                            return Err(reason_err!(
                                "LicenseExchange",
                                "server sent a licensing error: {:?} / {:?}",
                                error_message.error_code,
                                error_message.state_transition,
                            ));
                        }
                    }
                    InitialMessageType::LicenseRequest(_) => {
                        return Err(reason_err!(
                            "LicenseExchange",
                            "server requires a full license exchange, which is not supported",
                        ));
                    }
                }
            }

            LicenseExchangeState::LicenseExchanged => return Err(general_err!("license already exchanged")),
        };

        self.state = next_state;

        Ok(written)
    }
}
