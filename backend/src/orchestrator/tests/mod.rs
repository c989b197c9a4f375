// Year-loop failure handling: the failing year leaves nothing visible and
// the run is marked FAILED.
