/*!

This is the long-form manual for the `data_entry` library and the
`pollentry` command line client.

## The double entry workflow

The paper results of every polling station are typed in twice, by two
independent operators. Each pass is one *data entry*, identified by
(election, polling station, entry number) where the entry number is 1 or 2.
An entry is filled in section by section:

1. `recounted`: was there a recount at this station?
2. `voters_votes_counts`: admitted voters and cast votes (plus the
   recounted voter numbers when the election carries the recount flag)
3. `differences_counts`: explanations for differences between the two
4. `political_group_votes_N`: one section per candidate list, in list order
5. `save`: the final check before the entry is finalised

Every section submission sends the *entire* value tree to the server, which
revalidates the whole record and answers with the complete list of errors
(`F…` codes) and warnings (`W…` codes). The client attributes each result to
the section owning its field paths; a result owned by no section lands on
the `save` section. A section counts as saved once it has no errors and its
warnings are either gone or explicitly confirmed by the operator.

Finalisation is refused locally until every section is saved and clean.

## Claiming and resuming

A claim acquires the server-side record for an entry slot. Three outcomes:

* the record exists: editing resumes from the returned values,
* the record does not exist (404): the client synthesizes an all-zero
  record and persists it immediately, so the slot reads as "in progress"
  to everyone else from that moment on,
* anything else is a load failure.

The claim response carries an opaque `client_state` token. The client echoes
it back on every save, unchanged except for the `continue` flag it sets once
saving has started. Pausing an entry (abort) persists dirty values first;
discarding it (delete) removes the record server-side.

## Wire contract

Base resource:
`{base}/api/elections/{id}/polling_stations/{id}/data_entries/{n}`

| Operation | Request                | Success response                          |
|-----------|------------------------|-------------------------------------------|
| claim     | `POST {entry}/claim`   | `{ client_state, progress, data }` or 404  |
| save      | `POST {entry}`         | `{ validation_results: { errors, warnings } }` |
| finalise  | `POST {entry}/finalise`| empty                                      |
| delete    | `DELETE {entry}`       | 204                                        |

Failures come as `{ error, fatal, reference, code? }`; a `fatal` failure is
meant for a full-page error surface, everything else is retryable in place.
Transport failures are reported separately and never discard local values.

## Using the library

The coordinator is UI-agnostic. Construct a [`DataEntryController`]
(../struct.DataEntryController.html) with an [`EntryApi`](../trait.EntryApi.html)
implementation (the bundled `HttpEntryApi`, or your own for tests), the
election metadata and the entry target, then drive it:
`claim_or_create`, `set_values`, `submit_current`, `accept_warnings`,
`finalise` / `abort` / `delete`. The current phase and per-section statuses
are readable at any time through `state()` and `session()`.

 */
