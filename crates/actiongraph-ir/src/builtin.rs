/// The closed set of operations the interpreter handles itself.
///
/// Any other operation name is forwarded to the external operation host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinOperation {
  /// `get/eventValue`: resolve a query against the dispatch payload.
  EventValue,
  /// `get/sequenceValue`: resolve a query against earlier sequence results.
  SequenceValue,
  /// `get/dataValue`: read from the data store.
  GetDataValue,
  /// `set/dataValue`: write to the data store.
  SetDataValue,
  /// `map/actionValue`: resolve against the caller-supplied action values.
  ActionValue,
  /// `action/ifElse`: evaluate conditions and run one branch.
  IfElse,
}

impl BuiltinOperation {
  pub const ALL: [BuiltinOperation; 6] = [
    BuiltinOperation::EventValue,
    BuiltinOperation::SequenceValue,
    BuiltinOperation::GetDataValue,
    BuiltinOperation::SetDataValue,
    BuiltinOperation::ActionValue,
    BuiltinOperation::IfElse,
  ];

  pub fn name(self) -> &'static str {
    match self {
      BuiltinOperation::EventValue => "get/eventValue",
      BuiltinOperation::SequenceValue => "get/sequenceValue",
      BuiltinOperation::GetDataValue => "get/dataValue",
      BuiltinOperation::SetDataValue => "set/dataValue",
      BuiltinOperation::ActionValue => "map/actionValue",
      BuiltinOperation::IfElse => "action/ifElse",
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|op| op.name() == name)
  }
}
