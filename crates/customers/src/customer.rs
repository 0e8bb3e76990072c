use serde::{Deserialize, Serialize};

use eventide_core::{DomainError, impl_message};
use eventide_events::{BehaviorBuilder, CommandContext, Effect, Event, EventSourcedEntity};

/// Postal address of a customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
}

/// Customer state (rebuilt from events).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerState {
    pub email: String,
    pub name: String,
    pub address: Address,
    pub created: bool,
}

/// Command: CreateCustomer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCustomer {
    pub email: String,
    pub name: String,
    pub address: Address,
}

/// Command: ChangeCustomerName.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCustomerName {
    pub new_name: String,
}

/// Command: ChangeCustomerAddress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCustomerAddress {
    pub new_address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetCustomer {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerCommand {
    CreateCustomer(CreateCustomer),
    ChangeCustomerName(ChangeCustomerName),
    ChangeCustomerAddress(ChangeCustomerAddress),
    GetCustomer(GetCustomer),
}

impl_message!(CustomerCommand {
    CreateCustomer(CreateCustomer) => "CreateCustomer",
    ChangeCustomerName(ChangeCustomerName) => "ChangeCustomerName",
    ChangeCustomerAddress(ChangeCustomerAddress) => "ChangeCustomerAddress",
    GetCustomer(GetCustomer) => "GetCustomer",
});

/// Event: CustomerCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerCreated {
    pub email: String,
    pub name: String,
    pub address: Address,
}

/// Event: CustomerNameChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerNameChanged {
    pub new_name: String,
}

/// Event: CustomerAddressChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerAddressChanged {
    pub new_address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerEvent {
    CustomerCreated(CustomerCreated),
    CustomerNameChanged(CustomerNameChanged),
    CustomerAddressChanged(CustomerAddressChanged),
}

impl_message!(CustomerEvent {
    CustomerCreated(CustomerCreated) => "CustomerCreated",
    CustomerNameChanged(CustomerNameChanged) => "CustomerNameChanged",
    CustomerAddressChanged(CustomerAddressChanged) => "CustomerAddressChanged",
});

impl Event for CustomerEvent {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerReply {
    Done,
    Customer(CustomerState),
}

/// Entity: Customer.
#[derive(Debug, Clone, Copy)]
pub struct Customer;

impl EventSourcedEntity for Customer {
    const ENTITY_TYPE: &'static str = "customer";

    type State = CustomerState;
    type Command = CustomerCommand;
    type Event = CustomerEvent;
    type Reply = CustomerReply;

    fn empty_state() -> CustomerState {
        CustomerState::default()
    }

    fn register(b: &mut BehaviorBuilder<Self>) {
        b.on_command(Self::create)
            .on_command(Self::change_name)
            .on_command(Self::change_address)
            .on_command(Self::get)
            .on_event(|_: CustomerState, e: &CustomerCreated| CustomerState {
                email: e.email.clone(),
                name: e.name.clone(),
                address: e.address.clone(),
                created: true,
            })
            .on_event(|s: CustomerState, e: &CustomerNameChanged| CustomerState {
                name: e.new_name.clone(),
                ..s
            })
            .on_event(|s: CustomerState, e: &CustomerAddressChanged| CustomerState {
                address: e.new_address.clone(),
                ..s
            });
    }
}

fn validate_name(name: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), DomainError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(DomainError::validation("email must look like name@domain")),
    }
}

fn ensure_created(state: &CustomerState) -> Result<(), DomainError> {
    if !state.created {
        return Err(DomainError::not_found("customer does not exist"));
    }
    Ok(())
}

impl Customer {
    fn create(state: &CustomerState, cmd: CreateCustomer, _: &CommandContext) -> Effect<Customer> {
        if state.created {
            return Effect::error(DomainError::conflict("customer already exists"));
        }
        if let Err(e) = validate_name(&cmd.name).and_then(|_| validate_email(&cmd.email)) {
            return Effect::error(e);
        }
        Effect::emit(CustomerEvent::CustomerCreated(CustomerCreated {
            email: cmd.email,
            name: cmd.name,
            address: cmd.address,
        }))
        .then_reply(|_| CustomerReply::Done)
    }

    fn change_name(
        state: &CustomerState,
        cmd: ChangeCustomerName,
        _: &CommandContext,
    ) -> Effect<Customer> {
        if let Err(e) = ensure_created(state).and_then(|_| validate_name(&cmd.new_name)) {
            return Effect::error(e);
        }
        Effect::emit(CustomerEvent::CustomerNameChanged(CustomerNameChanged {
            new_name: cmd.new_name,
        }))
        .then_reply(|_| CustomerReply::Done)
    }

    fn change_address(
        state: &CustomerState,
        cmd: ChangeCustomerAddress,
        _: &CommandContext,
    ) -> Effect<Customer> {
        if let Err(e) = ensure_created(state) {
            return Effect::error(e);
        }
        Effect::emit(CustomerEvent::CustomerAddressChanged(CustomerAddressChanged {
            new_address: cmd.new_address,
        }))
        .then_reply(|_| CustomerReply::Done)
    }

    fn get(state: &CustomerState, _: GetCustomer, _: &CommandContext) -> Effect<Customer> {
        match ensure_created(state) {
            Ok(()) => Effect::reply(CustomerReply::Customer(state.clone())),
            Err(e) => Effect::error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventide_core::{EntityId, Metadata};
    use eventide_events::{Behavior, execute};

    fn ctx() -> CommandContext {
        CommandContext::new(EntityId::new("C1"), Metadata::new())
    }

    fn create_cmd() -> CustomerCommand {
        CustomerCommand::CreateCustomer(CreateCustomer {
            email: "ann@example.com".to_string(),
            name: "Ann".to_string(),
            address: Address {
                street: "Main St 1".to_string(),
                city: "Springfield".to_string(),
            },
        })
    }

    #[test]
    fn create_then_rename() {
        let b = Behavior::<Customer>::new().unwrap();
        let created = execute(&b, &CustomerState::default(), create_cmd(), &ctx()).unwrap();
        assert!(created.state.created);
        assert_eq!(created.state.name, "Ann");

        let renamed = execute(
            &b,
            &created.state,
            CustomerCommand::ChangeCustomerName(ChangeCustomerName {
                new_name: "Anna".to_string(),
            }),
            &ctx(),
        )
        .unwrap();
        assert_eq!(renamed.state.name, "Anna");
        assert_eq!(renamed.state.email, "ann@example.com");
    }

    #[test]
    fn create_rejects_duplicates_and_bad_input() {
        let b = Behavior::<Customer>::new().unwrap();
        let created = execute(&b, &CustomerState::default(), create_cmd(), &ctx()).unwrap();

        let err = execute(&b, &created.state, create_cmd(), &ctx())
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err.code(), "conflict");

        let bad_email = CustomerCommand::CreateCustomer(CreateCustomer {
            email: "nobody".to_string(),
            name: "Ann".to_string(),
            address: Address::default(),
        });
        let err = execute(&b, &CustomerState::default(), bad_email, &ctx())
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err.code(), "validation");
    }

    #[test]
    fn changes_require_an_existing_customer() {
        let b = Behavior::<Customer>::new().unwrap();
        let err = execute(
            &b,
            &CustomerState::default(),
            CustomerCommand::ChangeCustomerAddress(ChangeCustomerAddress {
                new_address: Address::default(),
            }),
            &ctx(),
        )
        .map(|_| ())
        .unwrap_err();
        assert_eq!(err.code(), "not_found");

        let err = execute(
            &b,
            &CustomerState::default(),
            CustomerCommand::GetCustomer(GetCustomer {}),
            &ctx(),
        )
        .map(|_| ())
        .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn events_round_trip_through_json() {
        let ev = CustomerEvent::CustomerNameChanged(CustomerNameChanged {
            new_name: "Bob".to_string(),
        });
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["CustomerNameChanged"]["new_name"], "Bob");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 128,
                ..ProptestConfig::default()
            })]

            /// Property: the last accepted rename wins, and replay agrees with live state.
            #[test]
            fn replay_matches_live_state(names in prop::collection::vec("[A-Za-z ]{0,12}", 0..10)) {
                let b = Behavior::<Customer>::new().unwrap();
                let created = execute(&b, &CustomerState::default(), create_cmd(), &ctx()).unwrap();
                let mut state = created.state;
                let mut log = created.events;

                for name in names {
                    let cmd = CustomerCommand::ChangeCustomerName(ChangeCustomerName { new_name: name });
                    if let Ok(out) = execute(&b, &state, cmd, &ctx()) {
                        log.extend(out.events);
                        state = out.state;
                    }
                }

                prop_assert!(!state.name.trim().is_empty());
                prop_assert_eq!(b.replay(&log), state);
            }
        }
    }
}
